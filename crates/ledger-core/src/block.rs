use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::constants::GENESIS_PREV_HASH;
use crate::crypto::Verifier;
use crate::error::{LedgerError, Result};
use crate::hash::{canonical_hash, canonical_object};
use crate::pow::{meets_difficulty, CancelToken};
use crate::{now_secs, Transaction};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub prev_hash: String,
    pub transactions: Vec<Transaction>,
    pub timestamp: u64,
    pub nonce: u64,
    pub hash: String,
    pub index: u64,
}

impl Block {
    /// Builds an unmined block with nonce 0 and its initial hash.
    pub fn new(
        transactions: Vec<Transaction>,
        timestamp: u64,
        prev_hash: impl Into<String>,
        index: u64,
    ) -> Self {
        let mut block = Self {
            prev_hash: prev_hash.into(),
            transactions,
            timestamp,
            nonce: 0,
            hash: String::new(),
            index,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Empty first block, back-referencing the `"0"` sentinel.
    pub fn genesis() -> Self {
        Self::new(vec![], now_secs(), GENESIS_PREV_HASH, 0)
    }

    pub fn calculate_hash(&self) -> String {
        self.hash_with_nonce(self.nonce)
    }

    /// Hash this block would have with `nonce`; `self` is not modified.
    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        let transactions = self
            .transactions
            .iter()
            .map(Transaction::canonical_record)
            .collect::<Vec<_>>();
        canonical_hash(&canonical_object([
            ("nonce", Value::from(nonce)),
            ("prev_hash", Value::from(self.prev_hash.as_str())),
            ("timestamp", Value::from(self.timestamp)),
            ("transactions", Value::Array(transactions)),
        ]))
    }

    /// Increments the nonce until the hash has `difficulty` leading zero hex
    /// digits. Runs until it succeeds.
    pub fn mine(&mut self, difficulty: u32) {
        // An unshared token is never cancelled.
        let _ = self.mine_with(difficulty, &CancelToken::new());
    }

    /// Like [`Block::mine`], checking `cancel` before every attempt. Returns
    /// the number of nonces tried.
    pub fn mine_with(&mut self, difficulty: u32, cancel: &CancelToken) -> Result<u64> {
        let mut attempts = 0u64;
        while !meets_difficulty(&self.hash, difficulty) {
            if cancel.is_cancelled() {
                debug!(index = self.index, attempts, "mining cancelled");
                return Err(LedgerError::MiningCancelled);
            }
            self.nonce = self.nonce.wrapping_add(1);
            self.hash = self.calculate_hash();
            attempts += 1;
        }
        info!(
            "Mined block {} with nonce {} and hash {}",
            self.index, self.nonce, self.hash
        );
        Ok(attempts)
    }

    pub fn has_valid_transactions(&self, verifier: &dyn Verifier) -> bool {
        self.transactions.iter().all(|tx| tx.is_valid(verifier))
    }
}
