use {
  crate::primitives::{Pubkey, ToBase58String},
  ed25519_dalek::Signature,
  multihash::{Code as MultihashCode, Hasher, Multihash, MultihashDigest, Sha3_256},
  serde::{Deserialize, Serialize},
};

/// A validator's stake in the shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
  pub validator: Pubkey,
  pub stake: u64,
}

/// An ed25519 signature attributed to the validator that produced it.
///
/// Used both as a block producer signature and as a genesis approval;
/// in each case the signed message is the multihash bytes of the
/// signed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSignature {
  pub validator: Pubkey,
  pub signature: Signature,
}

/// A block of the shard's DAG.
///
/// Blocks reference any number of parent blocks. The genesis block
/// has no parents, carries the initial bond table and is sent by no
/// validator (zero sender key).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
  pub parents: Vec<Multihash>,
  pub sender: Pubkey,
  pub bonds: Vec<Bond>,
  pub state_hash: Multihash,
  pub shard_id: String,
  pub timestamp: i64,
  pub signature: Option<ValidatorSignature>,
}

impl Block {
  /// Hash of the block contents, excluding the producer signature
  /// (the signature is computed over this hash).
  pub fn hash(&self) -> Multihash {
    let mut sha3 = Sha3_256::default();
    for parent in &self.parents {
      sha3.update(&parent.to_bytes());
    }
    sha3.update(&self.sender);
    for bond in &self.bonds {
      sha3.update(&bond.validator);
      sha3.update(&bond.stake.to_le_bytes());
    }
    sha3.update(&self.state_hash.to_bytes());
    sha3.update(self.shard_id.as_bytes());
    sha3.update(&self.timestamp.to_le_bytes());
    MultihashCode::Sha3_256.wrap(sha3.finalize()).unwrap()
  }
}

impl std::fmt::Debug for Block {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Block")
      .field("hash", &self.hash().to_b58())
      .field("parents", &self.parents.iter().map(|p| p.to_b58()).collect::<Vec<_>>())
      .field("sender", &self.sender)
      .field("shard_id", &self.shard_id)
      .field("timestamp", &self.timestamp)
      .finish()
  }
}

impl std::fmt::Display for Block {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.hash().to_b58())
  }
}

/// A genesis block proposed for approval, together with the number
/// of validator signatures the proposer requires before the shard
/// treats it as approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedBlockCandidate {
  pub block: Block,
  pub required_sigs: u32,
}

impl ApprovedBlockCandidate {
  /// Hash that genesis approvals are signed over.
  pub fn hash(&self) -> Multihash {
    let mut sha3 = Sha3_256::default();
    sha3.update(&self.block.hash().to_bytes());
    sha3.update(&self.required_sigs.to_le_bytes());
    MultihashCode::Sha3_256.wrap(sha3.finalize()).unwrap()
  }
}

/// A genesis candidate accompanied by the validator signatures that
/// meet (or claim to meet) its approval threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedBlock {
  pub candidate: ApprovedBlockCandidate,
  pub signatures: Vec<ValidatorSignature>,
}
