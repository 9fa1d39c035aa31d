//! The execution engine seam.
//!
//! Block execution itself lives outside this node core; the packet
//! handler only needs the engine to remember the bond table and to
//! produce the state transforms a block causes, so those two
//! operations are the whole trait surface.

use {
  crate::{
    consensus::{ApprovedBlock, Block, Bond},
    storage::DagRepresentation,
  },
  async_trait::async_trait,
  multihash::{Code as MultihashCode, Hasher, Multihash, MultihashDigest, Sha3_256},
  serde::{Deserialize, Serialize},
  std::sync::RwLock,
  thiserror::Error,
};

/// A single state delta produced by executing a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
  pub key: Multihash,
  pub value: Vec<u8>,
}

/// An approved block paired with the transforms its contained block
/// produced. This is what the `LastApprovedBlock` slot holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedBlockWithTransforms {
  pub approved: ApprovedBlock,
  pub transforms: Vec<Transform>,
}

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("Serialization Error: {0}")]
  Serialization(#[from] bincode::Error),
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
  async fn set_bonds(&self, bonds: &[Bond]) -> Result<(), EngineError>;

  async fn effects_for_block(
    &self,
    block: &Block,
    dag: &DagRepresentation,
  ) -> Result<Vec<Transform>, EngineError>;
}

/// The built-in engine.
///
/// Deploy execution is out of scope for this node, so the engine
/// derives transforms purely from block contents: one bond-table
/// write per bond, keyed by the hashed validator key. The derivation
/// is deterministic, which keeps replies and stored state identical
/// across all nodes of the shard.
#[derive(Default)]
pub struct DeterministicEngine {
  bonds: RwLock<Vec<Bond>>,
}

impl DeterministicEngine {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl ExecutionEngine for DeterministicEngine {
  async fn set_bonds(&self, bonds: &[Bond]) -> Result<(), EngineError> {
    *self.bonds.write().unwrap() = bonds.to_vec();
    Ok(())
  }

  async fn effects_for_block(
    &self,
    block: &Block,
    _dag: &DagRepresentation,
  ) -> Result<Vec<Transform>, EngineError> {
    let block_hash = block.hash();
    block
      .bonds
      .iter()
      .map(|bond| {
        let mut sha3 = Sha3_256::default();
        sha3.update(b"bonds");
        sha3.update(&bond.validator);
        sha3.update(&block_hash.to_bytes());
        Ok(Transform {
          key: MultihashCode::Sha3_256.wrap(sha3.finalize()).unwrap(),
          value: bincode::serialize(bond)?,
        })
      })
      .collect()
  }
}
