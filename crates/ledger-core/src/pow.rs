use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::info;

use crate::error::{LedgerError, Result};
use crate::Block;

/// Cooperative stop signal for proof-of-work searches.
///
/// Clones share the same flag, so a handle can be passed to another thread
/// and cancelled from there.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Number of leading `'0'` characters in a hex hash.
pub fn leading_zero_digits(hash: &str) -> u32 {
    hash.chars().take_while(|c| *c == '0').count() as u32
}

pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    leading_zero_digits(hash) >= difficulty
}

/// Mines `block` by searching nonces in parallel until the block hash has at
/// least `difficulty` leading zero hex digits.
///
/// The winning nonce is whichever worker finds one first, not necessarily the
/// smallest qualifying nonce.
pub fn mine_parallel(mut block: Block, difficulty: u32, cancel: &CancelToken) -> Result<Block> {
    let template = &block;
    let found = (0u64..u64::MAX).into_par_iter().find_any(|nonce| {
        cancel.is_cancelled() || meets_difficulty(&template.hash_with_nonce(*nonce), difficulty)
    });

    let nonce = match found {
        Some(nonce) if meets_difficulty(&block.hash_with_nonce(nonce), difficulty) => nonce,
        _ => return Err(LedgerError::MiningCancelled),
    };

    block.nonce = nonce;
    block.hash = block.calculate_hash();
    info!(
        "Mined block {} with nonce {} and hash {} (parallel)",
        block.index, block.nonce, block.hash
    );
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_zero_digits_examples() {
        assert_eq!(leading_zero_digits("00ab"), 2);
        assert_eq!(leading_zero_digits("abcd"), 0);
        assert_eq!(leading_zero_digits("0000"), 4);
        assert_eq!(leading_zero_digits(""), 0);
    }

    #[test]
    fn difficulty_zero_always_met() {
        assert!(meets_difficulty("ffff", 0));
        assert!(!meets_difficulty("0fff", 2));
        assert!(meets_difficulty("00ff", 2));
    }

    #[test]
    fn mine_parallel_example() {
        let block = Block::new(vec![], 1_600_000_000, "0".repeat(64), 1);
        let mined = mine_parallel(block, 3, &CancelToken::new()).unwrap();
        assert!(mined.hash.starts_with("000"));
        assert_eq!(mined.hash, mined.calculate_hash());
    }

    #[test]
    fn mine_parallel_respects_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let block = Block::new(vec![], 1_600_000_000, "0".repeat(64), 1);
        let err = mine_parallel(block, 64, &cancel).unwrap_err();
        assert!(matches!(err, LedgerError::MiningCancelled));
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }
}
