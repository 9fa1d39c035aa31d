//! The consensus instance constructed once the node knows an
//! approved genesis block.
//!
//! Computing fork choice is the consensus engine's own concern and
//! happens outside this node core. The instance kept here tracks the
//! DAG of admitted blocks and serves the most recently admitted
//! block as the current tip.

use {
  super::block::Block,
  crate::primitives::{Keypair, Pubkey, ToBase58String},
  dashmap::DashMap,
  multihash::Multihash,
  std::sync::RwLock,
  tracing::warn,
};

/// Outcome of offering a block to the consensus instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddBlock {
  Added,
  AlreadyKnown,
  MissingParents,
  WrongShard,
}

pub struct Casper {
  validator: Option<Keypair>,
  shard_id: String,
  blocks: DashMap<Multihash, Block>,
  tip: RwLock<Multihash>,
}

impl Casper {
  /// Creates a consensus instance seeded with the approved genesis
  /// block.
  pub fn hash_set_casper(
    validator: Option<Keypair>,
    genesis: Block,
    shard_id: String,
  ) -> Self {
    let hash = genesis.hash();
    let blocks = DashMap::new();
    blocks.insert(hash, genesis);
    Self {
      validator,
      shard_id,
      blocks,
      tip: RwLock::new(hash),
    }
  }

  pub fn contains(&self, block: &Block) -> bool {
    self.blocks.contains_key(&block.hash())
  }

  /// Offers a received block to the DAG.
  ///
  /// The doppelganger callback is invoked with the incoming block
  /// and this node's validator key before the block is admitted,
  /// which lets the caller detect another node signing with the
  /// same identity.
  pub fn add_block(
    &self,
    block: Block,
    doppelganger: impl Fn(&Block, &Pubkey),
  ) -> AddBlock {
    if let Some(keypair) = &self.validator {
      doppelganger(&block, &keypair.public());
    }

    if block.shard_id != self.shard_id {
      warn!(
        "Rejecting block {} from foreign shard {}",
        block,
        block.shard_id
      );
      return AddBlock::WrongShard;
    }

    let hash = block.hash();
    if self.blocks.contains_key(&hash) {
      return AddBlock::AlreadyKnown;
    }

    if block
      .parents
      .iter()
      .any(|parent| !self.blocks.contains_key(parent))
    {
      warn!("Rejecting block {} with unknown parents", block);
      return AddBlock::MissingParents;
    }

    self.blocks.insert(hash, block);
    *self.tip.write().unwrap() = hash;
    AddBlock::Added
  }

  /// The block served as the head of the chain: the most recently
  /// admitted block, the genesis until one is admitted.
  pub fn fork_choice_tip(&self) -> Block {
    let tip = *self.tip.read().unwrap();
    self.blocks.get(&tip).map(|b| b.value().clone()).unwrap()
  }
}

impl std::fmt::Debug for Casper {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Casper")
      .field("shard_id", &self.shard_id)
      .field("tip", &self.tip.read().unwrap().to_b58())
      .field("blocks", &self.blocks.len())
      .finish()
  }
}

#[cfg(test)]
mod test {
  use {
    super::{AddBlock, Casper},
    crate::{
      consensus::genesis::build_candidate,
      primitives::Keypair,
      test::utils::{child_of, genesis_params, keypair_n},
    },
    std::sync::atomic::{AtomicUsize, Ordering},
  };

  fn casper_with_two_validators() -> (Casper, Keypair, Keypair) {
    let (a, b) = (keypair_n(1), keypair_n(2));
    let params = genesis_params(&[&a, &b], 1);
    let genesis = build_candidate(&params).block;
    let casper =
      Casper::hash_set_casper(Some(a.clone()), genesis, params.shard_id);
    (casper, a, b)
  }

  #[test]
  fn duplicate_blocks_are_reported() {
    let (casper, a, _) = casper_with_two_validators();
    let block = child_of(&casper.fork_choice_tip(), &a);
    assert_eq!(casper.add_block(block.clone(), |_, _| ()), AddBlock::Added);
    assert!(casper.contains(&block));
    assert_eq!(casper.add_block(block, |_, _| ()), AddBlock::AlreadyKnown);
  }

  #[test]
  fn unknown_parents_are_rejected() {
    let (casper, a, _) = casper_with_two_validators();
    let orphan_parent = child_of(&casper.fork_choice_tip(), &a);
    let orphan = child_of(&orphan_parent, &a);
    assert_eq!(casper.add_block(orphan, |_, _| ()), AddBlock::MissingParents);
  }

  #[test]
  fn foreign_shard_blocks_are_rejected() {
    let (casper, a, _) = casper_with_two_validators();
    let mut block = child_of(&casper.fork_choice_tip(), &a);
    block.shard_id = "other-shard".to_owned();
    assert_eq!(casper.add_block(block, |_, _| ()), AddBlock::WrongShard);
  }

  #[test]
  fn the_tip_follows_admitted_blocks() {
    let (casper, a, b) = casper_with_two_validators();
    let genesis = casper.fork_choice_tip();

    let first = child_of(&genesis, &a);
    casper.add_block(first.clone(), |_, _| ());
    assert_eq!(casper.fork_choice_tip(), first);

    let second = child_of(&first, &b);
    casper.add_block(second.clone(), |_, _| ());
    assert_eq!(casper.fork_choice_tip(), second);

    // rejected blocks do not move the tip
    let mut foreign = child_of(&second, &a);
    foreign.shard_id = "other-shard".to_owned();
    casper.add_block(foreign, |_, _| ());
    assert_eq!(casper.fork_choice_tip(), second);
  }

  #[test]
  fn doppelganger_callback_sees_own_key() {
    let (casper, a, b) = casper_with_two_validators();
    let hits = AtomicUsize::new(0);
    let own = child_of(&casper.fork_choice_tip(), &a);
    casper.add_block(own, |incoming, own_key| {
      if &incoming.sender == own_key {
        hits.fetch_add(1, Ordering::SeqCst);
      }
    });
    let other = child_of(&casper.fork_choice_tip(), &b);
    casper.add_block(other, |incoming, own_key| {
      if &incoming.sender == own_key {
        hits.fetch_add(1, Ordering::SeqCst);
      }
    });
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }
}
