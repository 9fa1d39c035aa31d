use {
  super::{
    ApprovedBlockReceivedState,
    CasperEnv,
    CasperError,
    HandlerCell,
    HandlerState,
  },
  crate::{
    network::Peer,
    protocol::{self, CasperMessage, Packet},
  },
  std::sync::Arc,
  tracing::{info, warn},
};

/// Routes decoded packets to the active handler and performs the
/// approved-block state transition when a handler produces a new
/// consensus instance.
///
/// The dispatcher validates nothing itself; packets that do not
/// decode are dropped and everything else is forwarded verbatim.
pub struct PacketDispatcher {
  env: Arc<CasperEnv>,
  cell: HandlerCell,
}

impl PacketDispatcher {
  pub fn new(env: Arc<CasperEnv>, initial: HandlerState) -> Self {
    Self {
      env,
      cell: HandlerCell::new(initial),
    }
  }

  /// The handler cell, shared with the standalone promotion loop.
  pub fn cell(&self) -> HandlerCell {
    self.cell.clone()
  }

  pub async fn handle(
    &self,
    peer: &Peer,
    packet: Packet,
  ) -> Result<(), CasperError> {
    let message = match protocol::decode(&packet) {
      Some(message) => message,
      None => return Ok(()), // not a packet for this handler
    };

    let handler = self.cell.get();
    match message {
      CasperMessage::BlockMessage(block) => {
        handler.handle_block_message(&self.env, peer, block).await
      }
      CasperMessage::BlockRequest { hash } => {
        handler.handle_block_request(&self.env, peer, hash).await
      }
      CasperMessage::ForkChoiceTipRequest => {
        handler
          .handle_fork_choice_tip_request(&self.env, peer)
          .await
      }
      CasperMessage::ApprovedBlock(approved) => {
        match handler.handle_approved_block(&self.env, &approved).await? {
          Some(casper) => self.transition(casper, approved).await,
          None => Ok(()),
        }
      }
      CasperMessage::ApprovedBlockRequest { identifier } => {
        handler
          .handle_approved_block_request(&self.env, peer, identifier)
          .await
      }
      CasperMessage::UnapprovedBlock { candidate, .. } => {
        handler
          .handle_unapproved_block(&self.env, peer, candidate)
          .await
      }
      CasperMessage::BlockApproval {
        candidate_hash,
        approval,
      } => handler.handle_block_approval(&candidate_hash, approval).await,
      CasperMessage::NoApprovedBlockAvailable { node_id, .. } => {
        handler.handle_no_approved_block_available(&node_id).await
      }
    }
  }

  /// Installs the terminal handler. All side effects of the
  /// transition routine have already been performed by the time this
  /// runs, so readers of the cell always observe a consistent state.
  async fn transition(
    &self,
    casper: Arc<crate::consensus::Casper>,
    approved: crate::consensus::ApprovedBlock,
  ) -> Result<(), CasperError> {
    self.env.casper_ref.set(Arc::clone(&casper));
    self.cell.set(HandlerState::ApprovedBlockReceived(
      ApprovedBlockReceivedState { casper, approved },
    ));
    info!("Making a transition to ApprovedBlockReceived state.");

    let request = CasperMessage::ForkChoiceTipRequest.to_packet();
    let peers = self.env.transport.connected();
    if let Err(e) = self.env.transport.stream(&peers, request).await {
      warn!("Failed to send fork choice tip requests: {e}");
    }
    Ok(())
  }
}
