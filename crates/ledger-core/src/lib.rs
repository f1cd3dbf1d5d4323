//! Append-only proof-of-work ledger engine.
//!
//! Signed transfers are pooled, sealed into SHA-256 proof-of-work blocks and
//! reconciled across replicas with a longest-valid-chain rule.

pub mod block;
pub mod chain;
pub mod config;
pub mod consensus;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod pow;
pub mod transaction;

use std::time::{SystemTime, UNIX_EPOCH};

pub use block::Block;
pub use chain::{ChainSnapshot, Ledger};
pub use config::LedgerConfig;
pub use constants::{GENESIS_PREV_HASH, SYSTEM_ISSUER};
pub use crypto::{CryptoError, Ed25519Signer, Ed25519Verifier, Signer, Verifier};
pub use error::LedgerError;
pub use pow::CancelToken;
pub use transaction::Transaction;

/// Current Unix time in whole seconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
