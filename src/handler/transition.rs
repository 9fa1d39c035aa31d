use {
  super::CasperEnv,
  crate::{
    consensus::{self, ApprovedBlock, Casper},
    engine::{ApprovedBlockWithTransforms, EngineError},
    primitives::{Pubkey, ToBase58String},
  },
  std::{collections::HashSet, sync::Arc},
  thiserror::Error,
  tracing::info,
};

/// A failure while persisting or executing a valid approved block.
/// The handler does not transition when this is raised.
#[derive(Debug, Error)]
pub enum TransitionError {
  #[error("failed to persist the approved block: {0}")]
  Storage(#[from] crate::storage::Error),

  #[error("failed to compute block effects: {0}")]
  Execution(#[from] EngineError),
}

/// Validates a received approved block and, when valid, persists it
/// and constructs the consensus instance the node will participate
/// with.
///
/// Returns `None` when the block does not meet the signature
/// threshold; the caller makes no state change in that case.
pub async fn on_approved_block(
  env: &CasperEnv,
  approved: &ApprovedBlock,
  trusted: &HashSet<Pubkey>,
) -> Result<Option<Arc<Casper>>, TransitionError> {
  if !consensus::approved_block(approved, trusted, env.required_sigs) {
    info!("Invalid ApprovedBlock received; refusing to add.");
    return Ok(None);
  }
  info!("Valid ApprovedBlock received!");

  let block = approved.candidate.block.clone();
  let hash = block.hash();

  let dag = env.dag_store.representation();
  let transforms = env.engine.effects_for_block(&block, &dag).await?;
  env.block_store.put(hash, &block, &transforms)?;
  env.dag_store.insert(&block);
  env.last_approved.set(ApprovedBlockWithTransforms {
    approved: approved.clone(),
    transforms,
  });

  info!("Stored approved block {}", hash.to_b58());
  let casper = Casper::hash_set_casper(
    env.validator.clone(),
    block,
    env.shard_id.clone(),
  );
  Ok(Some(Arc::new(casper)))
}
