//! Zamfir, V., et al. "Introducing the minimal CBC Casper family of
//! consensus protocols." The packet-facing side of a CBC Casper node:
//! block and approval types, the genesis ceremony protocols and the
//! consensus instance constructed once an approved block is known.

mod approval;
mod block;
mod casper;
pub mod genesis;
mod validate;

pub use {
  approval::{ApprovalCollector, GenesisApprover},
  block::{
    ApprovedBlock,
    ApprovedBlockCandidate,
    Block,
    Bond,
    ValidatorSignature,
  },
  casper::{AddBlock, Casper},
  genesis::{GenesisError, GenesisParams, Wallet},
  validate::approved_block,
};
