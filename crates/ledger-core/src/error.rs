use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("not enough pending transactions to mine: {pending} pending, {required} required")]
    InsufficientPendingTransactions { pending: usize, required: usize },

    #[error("invalid chain at block {index}: {reason}")]
    InvalidChain { index: usize, reason: String },

    #[error("invalid ledger configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid peer address: {0:?}")]
    InvalidPeer(String),

    #[error("mining cancelled")]
    MiningCancelled,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
