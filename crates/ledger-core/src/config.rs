use serde::Deserialize;

use crate::constants::{
    DEFAULT_BLOCK_SIZE, DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD,
    DEFAULT_MIN_PENDING_TRANSACTIONS, HASH_HEX_SIZE,
};
use crate::error::{LedgerError, Result};

/// Tunables for a single ledger replica.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Leading zero hex digits a mined block hash must carry.
    pub difficulty: u32,
    pub mining_reward: u64,
    /// Maximum transactions per mined block.
    pub block_size: usize,
    /// Mining is refused while the pool holds fewer transactions than this.
    pub min_pending_transactions: usize,
    /// Search nonces on the rayon pool instead of sequentially.
    pub parallel_mining: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
            block_size: DEFAULT_BLOCK_SIZE,
            min_pending_transactions: DEFAULT_MIN_PENDING_TRANSACTIONS,
            parallel_mining: false,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(LedgerError::InvalidConfig(
                "block_size must be at least 1".into(),
            ));
        }
        if self.min_pending_transactions == 0 {
            return Err(LedgerError::InvalidConfig(
                "min_pending_transactions must be at least 1".into(),
            ));
        }
        if self.difficulty as usize > HASH_HEX_SIZE {
            return Err(LedgerError::InvalidConfig(format!(
                "difficulty {} exceeds hash width {}",
                self.difficulty, HASH_HEX_SIZE
            )));
        }
        Ok(())
    }
}
