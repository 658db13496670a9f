use anyhow::{Context, Result};
use ledger_core::{chain::ChainStore, Block};
use sled::{Batch, Db, IVec, Tree};
use std::path::Path;
use tracing::info;

const TREE_BLOCKS: &str = "blocks";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";
const KEY_TIP_HASH: &[u8] = b"tip_hash";

/// Chain snapshot keyed by big-endian block index, blocks stored as JSON.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let db = sled::open(path.as_ref())
      .with_context(|| format!("opening sled store at {}", path.as_ref().display()))?;
    info!("sled store opened");
    Ok(Self { db })
  }

  fn blocks(&self) -> Result<Tree> {
    Ok(self.db.open_tree(TREE_BLOCKS)?)
  }

  /// Drop every stored block and the tip markers.
  pub fn clear(&self) -> Result<()> {
    self.blocks()?.clear()?;
    self.db.remove(KEY_TIP_HEIGHT)?;
    self.db.remove(KEY_TIP_HASH)?;
    self.db.flush()?;
    Ok(())
  }

  fn set_tip(&self, block: &Block) -> Result<()> {
    self.db.insert(KEY_TIP_HEIGHT, block.index.to_be_bytes().to_vec())?;
    self.db.insert(KEY_TIP_HASH, block.hash.as_bytes())?;
    Ok(())
  }
}

fn decode(bytes: &IVec) -> Result<Block> {
  serde_json::from_slice(bytes).context("decoding stored block")
}

impl ChainStore for SledStore {
  fn put_chain(&self, chain: &[Block]) -> Result<()> {
    let tree = self.blocks()?;
    let mut batch = Batch::default();
    for block in chain {
      batch.insert(block.index.to_be_bytes().to_vec(), serde_json::to_vec(block)?);
    }
    // a replacement may be shorter than what is stored
    for entry in tree.range((chain.len() as u64).to_be_bytes()..) {
      let (key, _) = entry?;
      batch.remove(key);
    }
    tree.apply_batch(batch)?;

    if let Some(tip) = chain.last() {
      self.set_tip(tip)?;
    }
    self.db.flush()?;
    Ok(())
  }

  fn put_block(&self, block: &Block) -> Result<()> {
    let tree = self.blocks()?;
    tree.insert(block.index.to_be_bytes(), serde_json::to_vec(block)?)?;
    self.set_tip(block)?;
    self.db.flush()?;
    Ok(())
  }

  fn get_block(&self, index: u64) -> Result<Option<Block>> {
    let tree = self.blocks()?;
    tree.get(index.to_be_bytes())?.as_ref().map(decode).transpose()
  }

  fn load_chain(&self) -> Result<Option<Vec<Block>>> {
    let tree = self.blocks()?;
    if tree.is_empty() {
      return Ok(None);
    }
    let chain = tree
      .iter()
      .values()
      .map(|value| decode(&value?))
      .collect::<Result<Vec<_>>>()?;
    Ok(Some(chain))
  }

  fn tip_height(&self) -> Result<u64> {
    Ok(
      self
        .db
        .get(KEY_TIP_HEIGHT)?
        .map(|v| {
          let mut arr = [0u8; 8];
          arr.copy_from_slice(&v);
          u64::from_be_bytes(arr)
        })
        .unwrap_or(0),
    )
  }

  fn tip_hash(&self) -> Result<Option<String>> {
    self
      .db
      .get(KEY_TIP_HASH)?
      .map(|v| String::from_utf8(v.to_vec()).context("tip hash is not utf-8"))
      .transpose()
  }

  fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}
