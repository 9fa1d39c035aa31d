//! The genesis approval ceremony.
//!
//! A standalone node constructs the genesis candidate and runs an
//! [`ApprovalCollector`] that circulates it as an `UnapprovedBlock`
//! until enough validators sign it. Each ceremony validator runs a
//! [`GenesisApprover`] that recognizes the candidate it was
//! configured for and answers with a `BlockApproval`.

use {
  super::{
    block::{ApprovedBlock, ApprovedBlockCandidate, ValidatorSignature},
    genesis::{build_candidate, GenesisParams},
  },
  crate::{
    engine::{ApprovedBlockWithTransforms, Transform},
    network::{Peer, Transport},
    primitives::{Keypair, Pubkey, ToBase58String},
    protocol::CasperMessage,
    state::LastApprovedBlock,
  },
  dashmap::DashMap,
  ed25519_dalek::{PublicKey, Verifier},
  multihash::Multihash,
  std::{sync::Arc, time::Duration},
  tokio::time::{sleep, Instant},
  tracing::{info, warn},
};

/// Signs genesis candidates that match this validator's expected
/// genesis parameters.
pub struct GenesisApprover {
  keypair: Keypair,
  expected: ApprovedBlockCandidate,
  expected_hash: Multihash,
}

impl GenesisApprover {
  pub fn new(keypair: Keypair, params: &GenesisParams) -> Self {
    let expected = build_candidate(params);
    let expected_hash = expected.hash();
    Self {
      keypair,
      expected,
      expected_hash,
    }
  }

  /// Checks a circulated candidate against the expected genesis and
  /// streams a signed approval back to the proposer when they match.
  pub async fn on_unapproved_block(
    &self,
    transport: &dyn Transport,
    peer: &Peer,
    candidate: &ApprovedBlockCandidate,
  ) {
    if candidate != &self.expected {
      warn!(
        "Received unapproved block candidate {} from {} that does not \
         match the expected genesis {}; not signing it",
        candidate.hash().to_b58(),
        peer,
        self.expected_hash.to_b58()
      );
      return;
    }

    let approval = ValidatorSignature {
      validator: self.keypair.public(),
      signature: self.keypair.sign(&self.expected_hash.to_bytes()),
    };
    info!(
      "Approving genesis candidate {} for {}",
      self.expected_hash.to_b58(),
      peer
    );
    let message = CasperMessage::BlockApproval {
      candidate_hash: self.expected_hash,
      approval,
    };
    if let Err(e) = transport.stream(&[peer.clone()], message.to_packet()).await
    {
      warn!("Failed to send block approval to {peer}: {e}");
    }
  }
}

/// Collects validator approvals of the genesis candidate this node
/// constructed, and publishes the approved block once the required
/// signature count is met.
pub struct ApprovalCollector {
  candidate: ApprovedBlockCandidate,
  candidate_hash: Multihash,
  transforms: Vec<Transform>,
  required_sigs: u32,
  duration: Duration,
  interval: Duration,
  approvals: DashMap<Pubkey, ValidatorSignature>,
  last_approved: LastApprovedBlock,
}

impl ApprovalCollector {
  pub fn new(
    candidate: ApprovedBlockCandidate,
    transforms: Vec<Transform>,
    duration: Duration,
    interval: Duration,
    last_approved: LastApprovedBlock,
  ) -> Self {
    let candidate_hash = candidate.hash();
    Self {
      required_sigs: candidate.required_sigs,
      candidate,
      candidate_hash,
      transforms,
      duration,
      interval,
      approvals: DashMap::new(),
      last_approved,
    }
  }

  /// Signs our own candidate. The constructing node counts towards
  /// the approval threshold like any ceremony validator.
  pub fn approve_own(&self, keypair: &Keypair) {
    let approval = ValidatorSignature {
      validator: keypair.public(),
      signature: keypair.sign(&self.candidate_hash.to_bytes()),
    };
    self.insert(approval);
  }

  /// Records an approval received from the network. Approvals for a
  /// different candidate, with signatures that do not verify, or
  /// from a validator that already signed are dropped.
  pub fn add_approval(
    &self,
    candidate_hash: &Multihash,
    approval: ValidatorSignature,
  ) {
    if candidate_hash != &self.candidate_hash {
      warn!(
        "Ignoring approval of foreign candidate {} from {}",
        candidate_hash.to_b58(),
        approval.validator
      );
      return;
    }
    let verified = PublicKey::try_from(&approval.validator)
      .ok()
      .map(|public| {
        public
          .verify(&self.candidate_hash.to_bytes(), &approval.signature)
          .is_ok()
      })
      .unwrap_or(false);
    if !verified {
      warn!(
        "Ignoring approval with invalid signature from {}",
        approval.validator
      );
      return;
    }
    info!("Received block approval from {}", approval.validator);
    self.insert(approval);
  }

  fn insert(&self, approval: ValidatorSignature) {
    self.approvals.insert(approval.validator, approval);
    self.maybe_publish();
  }

  fn signature_count(&self) -> u32 {
    self.approvals.len() as u32
  }

  /// Publishes the approved block to the `LastApprovedBlock` slot
  /// once the threshold is met. The standalone promotion loop picks
  /// it up from there.
  fn maybe_publish(&self) {
    if self.signature_count() < self.required_sigs {
      return;
    }
    if self.last_approved.get().is_some() {
      return;
    }
    let mut signatures: Vec<_> =
      self.approvals.iter().map(|a| a.value().clone()).collect();
    signatures.sort_by_key(|s| s.validator);
    info!(
      "Genesis candidate {} reached {} of {} required approvals",
      self.candidate_hash.to_b58(),
      signatures.len(),
      self.required_sigs
    );
    self.last_approved.set(ApprovedBlockWithTransforms {
      approved: ApprovedBlock {
        candidate: self.candidate.clone(),
        signatures,
      },
      transforms: self.transforms.clone(),
    });
  }

  /// Circulates the candidate as an `UnapprovedBlock` every interval
  /// until the approved block is published or the ceremony deadline
  /// elapses.
  pub async fn run(self: Arc<Self>, transport: Arc<dyn Transport>) {
    // a zero threshold (single node shard) publishes immediately
    self.maybe_publish();

    let started = Instant::now();
    let deadline = started + self.duration;
    let timestamp = chrono::Utc::now().timestamp_millis();

    loop {
      if self.last_approved.get().is_some() {
        return;
      }
      if Instant::now() >= deadline {
        warn!(
          "Genesis approval deadline elapsed with {} of {} required \
           signatures; no approved block was produced",
          self.signature_count(),
          self.required_sigs
        );
        return;
      }
      let message = CasperMessage::UnapprovedBlock {
        candidate: self.candidate.clone(),
        timestamp,
        duration_millis: self.duration.as_millis() as u64,
      };
      if let Err(e) = transport.broadcast(message.to_packet()).await {
        warn!("Failed to circulate unapproved block: {e}");
      }
      sleep(self.interval).await;
    }
  }
}
