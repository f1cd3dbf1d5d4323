pub mod sled_store;

use anyhow::Result;
use ledger_core::Block;

/// Block persistence for a single replica.
pub trait Storage: Send + Sync {
    fn put_block(&self, block: &Block) -> Result<()>;
    fn get_block(&self, index: u64) -> Result<Option<Block>>;
    fn tip_height(&self) -> Result<u64>;
    fn tip_hash(&self) -> Result<Option<String>>;

    /// Writes consecutive blocks in one step. Either all land or none do.
    fn append_blocks(&self, blocks: &[Block]) -> Result<()>;

    /// All stored blocks in index order. Empty for a fresh store.
    fn load_chain(&self) -> Result<Vec<Block>>;

    /// Overwrites the stored chain, e.g. after adopting a peer's chain.
    fn replace_chain(&self, chain: &[Block]) -> Result<()>;
}
