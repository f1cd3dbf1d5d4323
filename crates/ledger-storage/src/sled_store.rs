use crate::Storage;
use anyhow::{bail, Context, Result};
use ledger_core::Block;
use sled::{Batch, Db, IVec, Tree};
use std::path::Path;
use tracing::info;

const TREE_BLOCKS: &str = "blocks";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";
const KEY_TIP_HASH: &[u8] = b"tip_hash";

#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let db = sled::open(path.as_ref())
      .with_context(|| format!("opening sled store at {}", path.as_ref().display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    info!("sled store opened");
    Ok(Self { db, blocks })
  }

  /// Removes every block and the tip markers.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.db.remove(KEY_TIP_HEIGHT)?;
    self.db.remove(KEY_TIP_HASH)?;
    self.db.flush()?;
    Ok(())
  }

  pub fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }

  fn write_block(&self, block: &Block) -> Result<()> {
    let bytes = bincode::serialize(block)?;
    self.blocks.insert(block.index.to_be_bytes(), bytes)?;
    self.set_tip(block)
  }

  fn set_tip(&self, tip: &Block) -> Result<()> {
    self.db.insert(KEY_TIP_HEIGHT, tip.index.to_be_bytes().to_vec())?;
    self.db.insert(KEY_TIP_HASH, tip.hash.as_bytes())?;
    Ok(())
  }
}

fn insert_blocks(batch: &mut Batch, blocks: &[Block]) -> Result<()> {
  for block in blocks {
    batch.insert(&block.index.to_be_bytes()[..], bincode::serialize(block)?);
  }
  Ok(())
}

fn decode_block(index: u64, bytes: &IVec) -> Result<Block> {
  bincode::deserialize(bytes).with_context(|| format!("decoding stored block {index}"))
}

impl Storage for SledStore {
  fn put_block(&self, block: &Block) -> Result<()> {
    self.write_block(block)?;
    self.db.flush()?;
    Ok(())
  }

  fn append_blocks(&self, blocks: &[Block]) -> Result<()> {
    let Some(tip) = blocks.last() else {
      return Ok(());
    };
    let mut batch = Batch::default();
    insert_blocks(&mut batch, blocks)?;
    self.blocks.apply_batch(batch)?;
    self.set_tip(tip)?;
    self.db.flush()?;
    Ok(())
  }

  fn get_block(&self, index: u64) -> Result<Option<Block>> {
    self
      .blocks
      .get(index.to_be_bytes())?
      .map(|bytes| decode_block(index, &bytes))
      .transpose()
  }

  fn tip_height(&self) -> Result<u64> {
    match self.db.get(KEY_TIP_HEIGHT)? {
      Some(v) => {
        let arr: [u8; 8] = v[..]
          .try_into()
          .context("tip height marker is not 8 bytes")?;
        Ok(u64::from_be_bytes(arr))
      }
      None => Ok(0),
    }
  }

  fn tip_hash(&self) -> Result<Option<String>> {
    self
      .db
      .get(KEY_TIP_HASH)?
      .map(|v| String::from_utf8(v.to_vec()).context("tip hash marker is not utf-8"))
      .transpose()
  }

  fn load_chain(&self) -> Result<Vec<Block>> {
    let mut chain = Vec::new();
    for entry in self.blocks.iter() {
      let (key, bytes) = entry?;
      let index = chain.len() as u64;
      if key[..] != index.to_be_bytes()[..] {
        bail!("stored chain has a gap before block {index}");
      }
      chain.push(decode_block(index, &bytes)?);
    }
    Ok(chain)
  }

  fn replace_chain(&self, chain: &[Block]) -> Result<()> {
    // One batch, so a failed write leaves the previous chain in place.
    let mut batch = Batch::default();
    for key in self.blocks.iter().keys() {
      batch.remove(key?);
    }
    insert_blocks(&mut batch, chain)?;
    self.blocks.apply_batch(batch)?;
    match chain.last() {
      Some(tip) => self.set_tip(tip)?,
      None => {
        self.db.remove(KEY_TIP_HEIGHT)?;
        self.db.remove(KEY_TIP_HASH)?;
      }
    }
    self.db.flush()?;
    info!(blocks = chain.len(), "stored chain replaced");
    Ok(())
  }
}
