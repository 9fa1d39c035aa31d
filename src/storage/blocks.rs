use {
  super::Error,
  crate::{consensus::Block, engine::Transform},
  multihash::Multihash,
  sled::Tree,
  std::path::PathBuf,
};

/// Persistent hash-indexed storage of blocks and the transforms
/// their execution produced.
///
/// Blocks and transforms live in separate trees under the same
/// database; a block put is always accompanied by its transforms so
/// the two trees stay in lockstep.
#[derive(Debug, Clone)]
pub struct BlockStore {
  blocks: Tree,
  transforms: Tree,
}

impl BlockStore {
  pub fn new(directory: PathBuf) -> Result<Self, Error> {
    let mut directory = directory;
    directory.push("blocks");
    std::fs::create_dir_all(directory.clone())?;
    Self::open(sled::open(directory)?)
  }

  /// An in-memory store that is discarded on drop. Used by tests.
  pub fn ephemeral() -> Result<Self, Error> {
    Self::open(sled::Config::new().temporary(true).open()?)
  }

  fn open(db: sled::Db) -> Result<Self, Error> {
    Ok(Self {
      blocks: db.open_tree("blocks")?,
      transforms: db.open_tree("transforms")?,
    })
  }

  pub fn put(
    &self,
    hash: Multihash,
    block: &Block,
    transforms: &[Transform],
  ) -> Result<(), Error> {
    let key = hash.to_bytes();
    self.blocks.insert(&key, bincode::serialize(block)?)?;
    self
      .transforms
      .insert(&key, bincode::serialize(transforms)?)?;
    Ok(())
  }

  pub fn get_block(&self, hash: &Multihash) -> Result<Option<Block>, Error> {
    match self.blocks.get(hash.to_bytes())? {
      Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
      None => Ok(None),
    }
  }

  pub fn get_transforms(
    &self,
    hash: &Multihash,
  ) -> Result<Option<Vec<Transform>>, Error> {
    match self.transforms.get(hash.to_bytes())? {
      Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
      None => Ok(None),
    }
  }

  pub fn contains(&self, hash: &Multihash) -> Result<bool, Error> {
    Ok(self.blocks.contains_key(hash.to_bytes())?)
  }
}
