pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// Sender identity for value created out of nothing (mining rewards).
pub const SYSTEM_ISSUER: &str = "Miner Rewards";
pub const GENESIS_PREV_HASH: &str = "0";

pub const DEFAULT_DIFFICULTY: u32 = 2;
pub const DEFAULT_MINING_REWARD: u64 = 50;
pub const DEFAULT_BLOCK_SIZE: usize = 10;
pub const DEFAULT_MIN_PENDING_TRANSACTIONS: usize = 2;
