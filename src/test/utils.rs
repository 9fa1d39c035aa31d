use {
  crate::{
    consensus::{
      genesis::build_candidate,
      ApprovedBlock,
      ApprovedBlockCandidate,
      Block,
      Bond,
      GenesisParams,
      ValidatorSignature,
    },
    engine::DeterministicEngine,
    handler::CasperEnv,
    network::{NetworkError, Peer, Transport},
    primitives::{Keypair, Pubkey},
    protocol::Packet,
    state::{CasperRef, LastApprovedBlock},
    storage::{BlockStore, DagStore},
  },
  async_trait::async_trait,
  ed25519_dalek::{PublicKey, SecretKey},
  std::sync::{Arc, Mutex},
};

pub const TEST_SHARD: &str = "caspian-test";

pub fn keypair_default() -> Keypair {
  let secret = SecretKey::from_bytes(&[
    157, 97, 177, 157, 239, 253, 90, 96, 186, 132, 74, 244, 146, 236, 44, 196,
    68, 73, 197, 105, 123, 50, 105, 25, 112, 59, 172, 3, 28, 174, 127, 96,
  ])
  .unwrap();
  let public: PublicKey = (&secret).into();
  ed25519_dalek::Keypair { secret, public }.into()
}

/// A distinct deterministic keypair per index.
pub fn keypair_n(n: u8) -> Keypair {
  let secret = SecretKey::from_bytes(&[n; 32]).unwrap();
  let public: PublicKey = (&secret).into();
  ed25519_dalek::Keypair { secret, public }.into()
}

pub fn genesis_params(
  validators: &[&Keypair],
  required_sigs: u32,
) -> GenesisParams {
  GenesisParams {
    shard_id: TEST_SHARD.to_owned(),
    timestamp: 1_640_995_200_000,
    bonds: validators
      .iter()
      .enumerate()
      .map(|(i, keypair)| Bond {
        validator: keypair.public(),
        stake: 100 + i as u64,
      })
      .collect(),
    wallets: vec![],
    minimum_bond: 1,
    maximum_bond: u64::MAX,
    has_faucet: false,
    required_sigs,
  }
}

pub fn genesis_candidate(params: &GenesisParams) -> ApprovedBlockCandidate {
  build_candidate(params)
}

pub fn genesis_block(validators: &[&Keypair]) -> Block {
  build_candidate(&genesis_params(validators, 1)).block
}

/// Signs a genesis candidate the way a ceremony validator would.
pub fn approve(
  candidate: &ApprovedBlockCandidate,
  keypair: &Keypair,
) -> ValidatorSignature {
  ValidatorSignature {
    validator: keypair.public(),
    signature: keypair.sign(&candidate.hash().to_bytes()),
  }
}

pub fn approved_block(
  candidate: &ApprovedBlockCandidate,
  signers: &[&Keypair],
) -> ApprovedBlock {
  ApprovedBlock {
    candidate: candidate.clone(),
    signatures: signers.iter().map(|k| approve(candidate, k)).collect(),
  }
}

/// A block extending `parent`, produced and signed by `keypair`.
pub fn child_of(parent: &Block, keypair: &Keypair) -> Block {
  let mut block = Block {
    parents: vec![parent.hash()],
    sender: keypair.public(),
    bonds: vec![],
    state_hash: parent.state_hash,
    shard_id: parent.shard_id.clone(),
    timestamp: parent.timestamp + 1,
    signature: None,
  };
  block.signature = Some(ValidatorSignature {
    validator: keypair.public(),
    signature: keypair.sign(&block.hash().to_bytes()),
  });
  block
}

/// A transport double that records everything instead of sending it.
pub struct TestTransport {
  local: Peer,
  connected: Vec<Peer>,
  pub streamed: Mutex<Vec<(Vec<Peer>, Packet)>>,
  pub broadcasted: Mutex<Vec<Packet>>,
}

impl TestTransport {
  pub fn new(local: Peer, connected: Vec<Peer>) -> Self {
    Self {
      local,
      connected,
      streamed: Mutex::new(vec![]),
      broadcasted: Mutex::new(vec![]),
    }
  }

  /// Packets streamed to the given peer with the given type id.
  pub fn streamed_to(&self, peer: &Peer, type_id: &str) -> Vec<Packet> {
    self
      .streamed
      .lock()
      .unwrap()
      .iter()
      .filter(|(peers, packet)| {
        peers.contains(peer) && packet.type_id == type_id
      })
      .map(|(_, packet)| packet.clone())
      .collect()
  }

  pub fn broadcasts(&self, type_id: &str) -> Vec<Packet> {
    self
      .broadcasted
      .lock()
      .unwrap()
      .iter()
      .filter(|packet| packet.type_id == type_id)
      .cloned()
      .collect()
  }
}

#[async_trait]
impl Transport for TestTransport {
  fn local(&self) -> Peer {
    self.local
  }

  fn connected(&self) -> Vec<Peer> {
    self.connected.clone()
  }

  async fn stream(
    &self,
    peers: &[Peer],
    packet: Packet,
  ) -> Result<(), NetworkError> {
    self
      .streamed
      .lock()
      .unwrap()
      .push((peers.to_vec(), packet));
    Ok(())
  }

  async fn broadcast(&self, packet: Packet) -> Result<(), NetworkError> {
    self.broadcasted.lock().unwrap().push(packet);
    Ok(())
  }
}

pub fn peer_n(n: u8) -> Peer {
  Peer {
    id: keypair_n(n).public(),
  }
}

/// A fully wired handler environment over in-memory collaborators.
pub fn casper_env(
  required_sigs: u32,
  validator: Option<Keypair>,
) -> (Arc<CasperEnv>, Arc<TestTransport>) {
  let local = Peer {
    id: validator
      .as_ref()
      .map(|k| k.public())
      .unwrap_or_else(|| Pubkey::zero()),
  };
  let transport = Arc::new(TestTransport::new(local, vec![peer_n(201)]));
  let env = Arc::new(CasperEnv {
    transport: transport.clone(),
    block_store: BlockStore::ephemeral().unwrap(),
    dag_store: Arc::new(DagStore::default()),
    engine: Arc::new(DeterministicEngine::new()),
    last_approved: LastApprovedBlock::empty(),
    casper_ref: CasperRef::empty(),
    shard_id: TEST_SHARD.to_owned(),
    validator,
    required_sigs,
  });
  (env, transport)
}
