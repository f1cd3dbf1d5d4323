//! Signing capabilities used by transactions.
//!
//! The ledger only ever talks to the [`Signer`] and [`Verifier`] traits, so the
//! signature scheme can be swapped without touching block or chain code. The
//! bundled implementation is Ed25519, with identities encoded as the hex form
//! of the 32-byte verifying key.

use ed25519_dalek::{
    Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey, PUBLIC_KEY_LENGTH,
    SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("secret key is not valid hex: {0}")]
    SecretKeyEncoding(#[from] hex::FromHexError),

    #[error("secret key must be {expected} bytes, got {actual}")]
    SecretKeyLength { expected: usize, actual: usize },

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Produces signatures on behalf of a single identity.
pub trait Signer {
    /// Public identity that verifiers check signatures against.
    fn identity(&self) -> String;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Checks signatures produced by a [`Signer`].
///
/// Implementations must return `false` for malformed identities or signatures
/// rather than erroring, since candidate chains arrive from untrusted peers.
pub trait Verifier: Send + Sync {
    fn verify(&self, identity: &str, message: &[u8], signature: &[u8]) -> bool;
}

#[derive(Clone)]
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_bytes(secret: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            key: SigningKey::from_bytes(secret),
        }
    }

    pub fn from_hex(secret: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(secret.trim())?;
        let secret: [u8; SECRET_KEY_LENGTH] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::SecretKeyLength {
                    expected: SECRET_KEY_LENGTH,
                    actual: bytes.len(),
                })?;
        Ok(Self::from_bytes(&secret))
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }
}

impl Signer for Ed25519Signer {
    fn identity(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature: Signature = self
            .key
            .try_sign(message)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl Verifier for Ed25519Verifier {
    fn verify(&self, identity: &str, message: &[u8], signature: &[u8]) -> bool {
        let Ok(key_bytes) = hex::decode(identity) else {
            return false;
        };
        let Ok(key_bytes) = <[u8; PUBLIC_KEY_LENGTH]>::try_from(key_bytes.as_slice()) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(message, &signature).is_ok()
    }
}
