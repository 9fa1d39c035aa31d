//! The lifecycle state machine of the packet handler.
//!
//! A node starts in one of three states chosen by its configured
//! role: a genesis ceremony validator, the standalone genesis
//! constructor, or a bootstrapping default node. All three terminate
//! in [`HandlerState::ApprovedBlockReceived`] once the shard's
//! approved block is known, and that state is absorbing.

mod dispatcher;
mod tasks;
mod transition;

pub use {
  dispatcher::PacketDispatcher,
  tasks::{spawn_bootstrap_requester, spawn_standalone_promotion},
  transition::TransitionError,
};

use {
  crate::{
    consensus::{
      ApprovalCollector,
      ApprovedBlock,
      ApprovedBlockCandidate,
      Block,
      Casper,
      GenesisApprover,
      ValidatorSignature,
    },
    engine::ExecutionEngine,
    metrics::{BLOCKS_RECEIVED, BLOCKS_RECEIVED_AGAIN},
    network::{NetworkError, Peer, Transport},
    primitives::{Keypair, Pubkey, ToBase58String},
    protocol::{type_ids, CasperMessage},
    state::{CasperRef, LastApprovedBlock, Shared},
    storage::{BlockStore, DagStore},
  },
  metrics::counter,
  multihash::Multihash,
  std::{collections::HashSet, sync::Arc},
  thiserror::Error,
  tracing::{info, warn},
};

/// Everything the handler states consume from their environment.
pub struct CasperEnv {
  pub transport: Arc<dyn Transport>,
  pub block_store: BlockStore,
  pub dag_store: Arc<DagStore>,
  pub engine: Arc<dyn ExecutionEngine>,
  pub last_approved: LastApprovedBlock,
  pub casper_ref: CasperRef,
  pub shard_id: String,
  pub validator: Option<Keypair>,
  pub required_sigs: u32,
}

/// The atomically swappable reference to the active handler.
pub type HandlerCell = Shared<HandlerState>;

#[derive(Debug, Error)]
pub enum CasperError {
  #[error(transparent)]
  Storage(#[from] crate::storage::Error),

  #[error(transparent)]
  Transition(#[from] TransitionError),

  #[error(transparent)]
  Network(#[from] NetworkError),
}

pub struct GenesisValidatorState {
  pub approver: GenesisApprover,
  pub validator: Keypair,
}

pub struct StandaloneState {
  pub collector: Arc<ApprovalCollector>,
}

pub struct BootstrapState {
  pub known_validators: HashSet<Pubkey>,
}

pub struct ApprovedBlockReceivedState {
  pub casper: Arc<Casper>,
  pub approved: ApprovedBlock,
}

pub enum HandlerState {
  GenesisValidator(GenesisValidatorState),
  Standalone(StandaloneState),
  Bootstrap(BootstrapState),
  ApprovedBlockReceived(ApprovedBlockReceivedState),
}

impl HandlerState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::ApprovedBlockReceived(_))
  }

  pub async fn handle_block_message(
    &self,
    _env: &CasperEnv,
    peer: &Peer,
    block: Block,
  ) -> Result<(), CasperError> {
    let state = match self {
      Self::ApprovedBlockReceived(state) => state,
      _ => return Ok(()),
    };

    counter!(BLOCKS_RECEIVED).increment(1);
    let hash = block.hash();
    if state.casper.contains(&block) {
      info!("Received block {} again.", hash.to_b58());
      counter!(BLOCKS_RECEIVED_AGAIN).increment(1);
      return Ok(());
    }

    info!("Received block {} from {}.", hash.to_b58(), peer);
    let peer = *peer;
    state.casper.add_block(block, move |incoming, own_key| {
      if &incoming.sender == own_key {
        warn!(
          "There is another node {} proposing blocks using the same \
           validator key {}. Check your validator key configuration.",
          peer, own_key
        );
      }
    });
    Ok(())
  }

  pub async fn handle_block_request(
    &self,
    env: &CasperEnv,
    peer: &Peer,
    hash: Multihash,
  ) -> Result<(), CasperError> {
    if !self.is_terminal() {
      return Ok(());
    }

    match env.block_store.get_block(&hash)? {
      Some(block) => {
        let message = CasperMessage::BlockMessage(block);
        env.transport.stream(&[*peer], message.to_packet()).await?;
        info!("Response sent to {} for block request {}", peer, hash.to_b58());
      }
      None => {
        info!(
          "No response given since block {} was not found",
          hash.to_b58()
        );
      }
    }
    Ok(())
  }

  pub async fn handle_fork_choice_tip_request(
    &self,
    env: &CasperEnv,
    peer: &Peer,
  ) -> Result<(), CasperError> {
    let state = match self {
      Self::ApprovedBlockReceived(state) => state,
      _ => return Ok(()),
    };

    let tip = state.casper.fork_choice_tip();
    let message = CasperMessage::BlockMessage(tip);
    env.transport.stream(&[*peer], message.to_packet()).await?;
    Ok(())
  }

  /// The only operation that can produce a new consensus instance.
  /// A `Some` return tells the dispatcher to perform the transition.
  pub async fn handle_approved_block(
    &self,
    env: &CasperEnv,
    approved: &ApprovedBlock,
  ) -> Result<Option<Arc<Casper>>, CasperError> {
    let trusted = match self {
      Self::GenesisValidator(state) => {
        // only our own signature is authoritative for leaving the
        // ceremony validator state.
        HashSet::from([state.validator.public()])
      }
      Self::Bootstrap(state) => state.known_validators.clone(),
      // a standalone node never accepts externally delivered
      // approved blocks; its exit is driven by the promotion loop.
      Self::Standalone(_) | Self::ApprovedBlockReceived(_) => {
        return Ok(None)
      }
    };

    Ok(transition::on_approved_block(env, approved, &trusted).await?)
  }

  pub async fn handle_approved_block_request(
    &self,
    env: &CasperEnv,
    peer: &Peer,
    identifier: String,
  ) -> Result<(), CasperError> {
    let packet = match self {
      Self::ApprovedBlockReceived(state) => {
        CasperMessage::ApprovedBlock(state.approved.clone()).to_packet()
      }
      // before the transition there is nothing to serve yet
      _ => no_approved_block_available(env, identifier),
    };
    env.transport.stream(&[*peer], packet).await?;
    Ok(())
  }

  pub async fn handle_unapproved_block(
    &self,
    env: &CasperEnv,
    peer: &Peer,
    candidate: ApprovedBlockCandidate,
  ) -> Result<(), CasperError> {
    if let Self::GenesisValidator(state) = self {
      state
        .approver
        .on_unapproved_block(env.transport.as_ref(), peer, &candidate)
        .await;
    }
    Ok(())
  }

  pub async fn handle_block_approval(
    &self,
    candidate_hash: &Multihash,
    approval: ValidatorSignature,
  ) -> Result<(), CasperError> {
    if let Self::Standalone(state) = self {
      state.collector.add_approval(candidate_hash, approval);
    }
    Ok(())
  }

  pub async fn handle_no_approved_block_available(
    &self,
    node_id: &str,
  ) -> Result<(), CasperError> {
    info!("No approved block available on node {node_id}");
    Ok(())
  }
}

/// Builds the reply for peers that ask for an approved block before
/// this node has one.
pub fn no_approved_block_available(
  env: &CasperEnv,
  identifier: String,
) -> crate::protocol::Packet {
  CasperMessage::NoApprovedBlockAvailable {
    identifier,
    node_id: env.transport.local().to_string(),
  }
  .to_packet()
}

/// The identifier used when this node itself requests an approved
/// block from its peers.
pub const APPROVED_BLOCK_REQUEST_ID: &str = type_ids::APPROVED_BLOCK_REQUEST;
