use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::SYSTEM_ISSUER;
use crate::crypto::{CryptoError, Signer, Verifier};
use crate::hash::{canonical_hash, canonical_object};
use crate::now_secs;

/// A value transfer between two identities.
///
/// Identity is the content hash: two transactions with the same sender,
/// recipient, amount and timestamp are equal regardless of their signatures.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    pub timestamp: u64,
    #[serde(default, with = "hex_signature")]
    pub signature: Option<Vec<u8>>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.amount == other.amount
            && self.sender == other.sender
            && self.recipient == other.recipient
    }
}

impl Eq for Transaction {}

impl Transaction {
    /// Unsigned transfer stamped with the current time.
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: u64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            timestamp: now_secs(),
            signature: None,
        }
    }

    /// Value created by the system, e.g. a mining reward. Needs no signature.
    pub fn issuance(recipient: impl Into<String>, amount: u64) -> Self {
        Self::new(SYSTEM_ISSUER, recipient, amount)
    }

    pub fn is_issuance(&self) -> bool {
        self.sender == SYSTEM_ISSUER
    }

    pub fn content_hash(&self) -> String {
        canonical_hash(&self.canonical_content())
    }

    /// Signs the content hash. Issuance transactions are left untouched.
    /// Calling this again replaces any previous signature.
    pub fn sign(&mut self, signer: &dyn Signer) -> Result<(), CryptoError> {
        if self.is_issuance() {
            return Ok(());
        }
        let signature = signer.sign(self.content_hash().as_bytes())?;
        self.signature = Some(signature);
        Ok(())
    }

    pub fn is_valid(&self, verifier: &dyn Verifier) -> bool {
        if self.is_issuance() {
            return true;
        }
        match &self.signature {
            Some(signature) => {
                verifier.verify(&self.sender, self.content_hash().as_bytes(), signature)
            }
            None => false,
        }
    }

    fn canonical_content(&self) -> Value {
        canonical_object([
            ("amount", Value::from(self.amount)),
            ("recipient", Value::from(self.recipient.as_str())),
            ("sender", Value::from(self.sender.as_str())),
            ("timestamp", Value::from(self.timestamp)),
        ])
    }

    /// Representation used inside a block hash. Unlike the content hash this
    /// covers the signature, so swapping signatures invalidates the block.
    pub(crate) fn canonical_record(&self) -> Value {
        canonical_object([
            ("amount", Value::from(self.amount)),
            ("recipient", Value::from(self.recipient.as_str())),
            ("sender", Value::from(self.sender.as_str())),
            ("signature", Value::from(self.signature.as_deref().map(hex::encode))),
            ("timestamp", Value::from(self.timestamp)),
        ])
    }
}

mod hex_signature {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(signature: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match signature {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
