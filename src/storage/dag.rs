use {
  crate::consensus::Block,
  dashmap::DashMap,
  multihash::Multihash,
  std::collections::HashMap,
};

/// Live parent/children bookkeeping of the block DAG.
///
/// The store is shared between the transition routine (which seeds
/// it with the approved genesis) and the execution engine (which
/// reads a snapshot when computing block effects).
#[derive(Debug, Default)]
pub struct DagStore {
  parents: DashMap<Multihash, Vec<Multihash>>,
  children: DashMap<Multihash, Vec<Multihash>>,
}

/// A point-in-time snapshot of the DAG shape.
#[derive(Debug, Clone, Default)]
pub struct DagRepresentation {
  pub parents: HashMap<Multihash, Vec<Multihash>>,
  pub children: HashMap<Multihash, Vec<Multihash>>,
}

impl DagRepresentation {
  pub fn contains(&self, hash: &Multihash) -> bool {
    self.parents.contains_key(hash)
  }

  /// Blocks that no other known block builds on.
  pub fn tips(&self) -> Vec<Multihash> {
    self
      .parents
      .keys()
      .filter(|hash| {
        self
          .children
          .get(hash)
          .map(|children| children.is_empty())
          .unwrap_or(true)
      })
      .copied()
      .collect()
  }
}

impl DagStore {
  pub fn insert(&self, block: &Block) {
    let hash = block.hash();
    self.parents.insert(hash, block.parents.clone());
    self.children.entry(hash).or_default();
    for parent in &block.parents {
      self.children.entry(*parent).or_default().push(hash);
    }
  }

  pub fn representation(&self) -> DagRepresentation {
    DagRepresentation {
      parents: self
        .parents
        .iter()
        .map(|e| (*e.key(), e.value().clone()))
        .collect(),
      children: self
        .children
        .iter()
        .map(|e| (*e.key(), e.value().clone()))
        .collect(),
    }
  }
}
