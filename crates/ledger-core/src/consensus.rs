//! Longest-valid-chain conflict resolution.
//!
//! Length is the only fitness metric. Cumulative work is deliberately not
//! weighed: a longer chain mined at a lower difficulty still wins.

use tracing::{info, warn};

use crate::chain::{ChainSnapshot, Ledger};
use crate::Block;

impl Ledger {
    /// Adopts the longest candidate that is strictly longer than the local
    /// chain and validates. Returns whether the local chain was replaced.
    ///
    /// Each bad candidate is rejected on its own; the rest are still
    /// considered. Among equally long winners the first one seen is kept.
    pub fn resolve_conflicts<I>(&mut self, candidates: I) -> bool
    where
        I: IntoIterator<Item = ChainSnapshot>,
    {
        let mut best: Option<Vec<Block>> = None;
        let mut max_length = self.len();

        for candidate in candidates {
            if candidate.length != candidate.chain.len() {
                warn!(
                    reported = candidate.length,
                    actual = candidate.chain.len(),
                    "ignoring candidate chain with inconsistent length"
                );
                continue;
            }
            if candidate.length <= max_length {
                continue;
            }
            if let Err(err) = self.validate_chain(&candidate.chain) {
                warn!(length = candidate.length, "ignoring invalid candidate chain: {err}");
                continue;
            }
            max_length = candidate.length;
            best = Some(candidate.chain);
        }

        match best {
            Some(chain) => {
                info!(
                    from = self.len(),
                    to = chain.len(),
                    "replacing local chain with longer peer chain"
                );
                self.replace_chain(chain);
                true
            }
            None => false,
        }
    }
}
