//! Long-lived background tasks of the pre-transition states.

use {
  super::{
    ApprovedBlockReceivedState,
    CasperEnv,
    HandlerCell,
    HandlerState,
    APPROVED_BLOCK_REQUEST_ID,
  },
  crate::{consensus::Casper, protocol::CasperMessage},
  std::{sync::Arc, time::Duration},
  tokio::{task::JoinHandle, time::sleep},
  tracing::{error, info, warn},
};

/// Watches the `LastApprovedBlock` slot of a standalone node and
/// promotes the handler to `ApprovedBlockReceived` once the genesis
/// ceremony populates it.
///
/// This loop is the only writer that moves a node out of the
/// standalone state; externally delivered approved blocks never do.
pub fn spawn_standalone_promotion(
  env: Arc<CasperEnv>,
  cell: HandlerCell,
  interval: Duration,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    loop {
      sleep(interval).await;
      let approved = match env.last_approved.get() {
        Some(approved) => approved,
        None => continue,
      };

      let block = approved.approved.candidate.block.clone();
      let hash = block.hash();
      if let Err(e) =
        env.block_store.put(hash, &block, &approved.transforms)
      {
        error!("Failed to persist the approved genesis: {e}");
        continue;
      }
      env.dag_store.insert(&block);

      let casper = Arc::new(Casper::hash_set_casper(
        env.validator.clone(),
        block,
        env.shard_id.clone(),
      ));
      env.casper_ref.set(Arc::clone(&casper));
      cell.set(HandlerState::ApprovedBlockReceived(
        ApprovedBlockReceivedState {
          casper,
          approved: approved.approved,
        },
      ));
      info!("Making a transition to ApprovedBlockReceived state.");

      let request = CasperMessage::ForkChoiceTipRequest.to_packet();
      let peers = env.transport.connected();
      if let Err(e) = env.transport.stream(&peers, request).await {
        warn!("Failed to send fork choice tip requests: {e}");
      }
      return;
    }
  })
}

/// Periodically asks the shard for its approved block while the node
/// is bootstrapping. Stops once the handler cell turns terminal.
pub fn spawn_bootstrap_requester(
  env: Arc<CasperEnv>,
  cell: HandlerCell,
  delay: Duration,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    loop {
      sleep(delay).await;
      if cell.get().is_terminal() {
        return;
      }
      info!("Requesting the approved block from peers");
      let request = CasperMessage::ApprovedBlockRequest {
        identifier: APPROVED_BLOCK_REQUEST_ID.to_owned(),
      }
      .to_packet();
      if let Err(e) = env.transport.broadcast(request).await {
        warn!("Failed to request the approved block: {e}");
      }
    }
  })
}
