//! The peer-to-peer transport of the node.
//!
//! The packet handler core only ever talks to the [`Transport`]
//! trait; the production implementation below runs a libp2p swarm on
//! its own task and exchanges packets over gossipsub topics. Every
//! node subscribes to the shard-wide packet topic and to a private
//! inbox topic derived from its public key, which is how point to
//! point streaming is expressed on top of gossip.

use {
  crate::{
    primitives::{Keypair, Pubkey},
    protocol::Packet,
  },
  async_trait::async_trait,
  dashmap::DashSet,
  futures::StreamExt,
  libp2p::{
    core::{muxing::StreamMuxerBox, transport::Boxed, upgrade::Version},
    dns::{DnsConfig, ResolverConfig, ResolverOpts},
    gossipsub::{
      Gossipsub,
      GossipsubConfigBuilder,
      GossipsubEvent,
      IdentTopic,
      MessageAuthenticity,
      error::PublishError,
    },
    identity::{self, ed25519::SecretKey},
    noise,
    swarm::SwarmEvent,
    Multiaddr,
    PeerId,
    Swarm,
    Transport as _,
  },
  serde::{Deserialize, Serialize},
  std::{sync::Arc, time::Duration},
  thiserror::Error,
  tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
  tracing::{debug, error, warn},
};

/// Maximum size of a gossiped packet. Genesis candidates carry the
/// full bond table, so this is far above the usual packet size.
const MAX_TRANSMIT_SIZE: usize = 4 * 1024 * 1024;

/// How long to wait before retrying a publish that failed because
/// the mesh had no peers for the topic yet.
const PUBLISH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Another node of the shard, addressed by its public key.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct Peer {
  pub id: Pubkey,
}

impl std::fmt::Display for Peer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.id)
  }
}

/// The unit that travels on the wire: a packet attributed to the
/// node that sent it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blob {
  pub sender: Peer,
  pub packet: Packet,
}

#[derive(Debug, Error)]
pub enum NetworkError {
  #[error("IO Error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Gossip Error: {0}")]
  Gossip(String),

  #[error("the network task is no longer running")]
  TaskGone,
}

/// The transport surface the packet handler consumes.
#[async_trait]
pub trait Transport: Send + Sync {
  /// The identity packets from this node are attributed to.
  fn local(&self) -> Peer;

  /// Peers with at least one live connection.
  fn connected(&self) -> Vec<Peer>;

  /// Sends a packet to each of the given peers.
  async fn stream(
    &self,
    peers: &[Peer],
    packet: Packet,
  ) -> Result<(), NetworkError>;

  /// Publishes a packet to every node of the shard.
  async fn broadcast(&self, packet: Packet) -> Result<(), NetworkError>;
}

#[derive(Debug)]
pub enum NetworkEvent {
  PacketReceived { from: Peer, packet: Packet },
}

enum NetworkCommand {
  Connect(Multiaddr),
  Stream { peers: Vec<Peer>, blob: Blob },
  Broadcast(Blob),
}

type BoxedTransport = Boxed<(PeerId, StreamMuxerBox)>;

async fn create_transport(
  keypair: &Keypair,
) -> std::io::Result<BoxedTransport> {
  let transport = {
    let tcp = libp2p::tcp::TcpConfig::new().nodelay(true).port_reuse(true);
    DnsConfig::custom(
      tcp,
      ResolverConfig::default(),
      ResolverOpts::default(),
    )
    .await?
  };

  let noise_keys = noise::Keypair::<noise::X25519Spec>::new()
    .into_authentic(&identity::Keypair::Ed25519(
      SecretKey::from_bytes(keypair.secret().to_bytes())
        .unwrap()
        .into(),
    ))
    .expect("Signing libp2p-noise static DH keypair failed.");

  Ok(
    transport
      .upgrade(Version::V1)
      .authenticate(noise::NoiseConfig::xx(noise_keys).into_authenticated())
      .multiplex(libp2p::yamux::YamuxConfig::default())
      .boxed(),
  )
}

fn broadcast_topic(shard_id: &str) -> String {
  format!("/{shard_id}/packets")
}

fn inbox_topic(shard_id: &str, peer: &Peer) -> String {
  format!("/{shard_id}/packets/{peer}")
}

/// The shareable sending half of the network. This is the
/// [`Transport`] implementation handed to the dispatcher and the
/// background tasks.
#[derive(Clone)]
pub struct NetworkHandle {
  local: Peer,
  netout: UnboundedSender<NetworkCommand>,
  connected: Arc<DashSet<Pubkey>>,
}

#[async_trait]
impl Transport for NetworkHandle {
  fn local(&self) -> Peer {
    self.local
  }

  fn connected(&self) -> Vec<Peer> {
    self.connected.iter().map(|id| Peer { id: *id }).collect()
  }

  async fn stream(
    &self,
    peers: &[Peer],
    packet: Packet,
  ) -> Result<(), NetworkError> {
    self
      .netout
      .send(NetworkCommand::Stream {
        peers: peers.to_vec(),
        blob: Blob {
          sender: self.local,
          packet,
        },
      })
      .map_err(|_| NetworkError::TaskGone)
  }

  async fn broadcast(&self, packet: Packet) -> Result<(), NetworkError> {
    self
      .netout
      .send(NetworkCommand::Broadcast(Blob {
        sender: self.local,
        packet,
      }))
      .map_err(|_| NetworkError::TaskGone)
  }
}

pub struct Network {
  handle: NetworkHandle,
  netin: UnboundedReceiver<NetworkEvent>,
}

impl Network {
  pub async fn new(
    shard_id: impl Into<String>,
    keypair: Keypair,
    listenaddrs: impl Iterator<Item = Multiaddr>,
  ) -> Result<Self, NetworkError> {
    let shard_id = shard_id.into();
    let local = Peer {
      id: keypair.public(),
    };

    let id = identity::Keypair::Ed25519(
      identity::ed25519::SecretKey::from_bytes(
        &mut keypair.secret().to_bytes(),
      )
      .unwrap()
      .into(),
    );

    let gossip_config = GossipsubConfigBuilder::default()
      .max_transmit_size(MAX_TRANSMIT_SIZE)
      .build()
      .map_err(|e| NetworkError::Gossip(e.to_string()))?;
    let gossipsub =
      Gossipsub::new(MessageAuthenticity::Signed(id.clone()), gossip_config)
        .map_err(|e| NetworkError::Gossip(e.to_string()))?;

    let mut swarm = Swarm::new(
      create_transport(&keypair).await?,
      gossipsub,
      id.public().to_peer_id(),
    );

    // every node listens on the shard-wide packet topic and on its
    // own inbox topic.
    for topic in [
      broadcast_topic(&shard_id),
      inbox_topic(&shard_id, &local),
    ] {
      swarm
        .behaviour_mut()
        .subscribe(&IdentTopic::new(topic))
        .map_err(|e| NetworkError::Gossip(format!("{e:?}")))?;
    }

    listenaddrs.for_each(|addr| {
      swarm.listen_on(addr).unwrap();
    });

    let connected = Arc::new(DashSet::new());
    let (netin_tx, netin_rx) = unbounded_channel();
    let (netout_tx, mut netout_rx) = unbounded_channel();

    let handle = NetworkHandle {
      local,
      netout: netout_tx.clone(),
      connected: Arc::clone(&connected),
    };

    tokio::spawn(async move {
      loop {
        tokio::select! {
          Some(event) = swarm.next() => match event {
            SwarmEvent::Behaviour(GossipsubEvent::Message {
              message, ..
            }) => match bincode::deserialize::<Blob>(&message.data) {
              Ok(blob) => {
                if blob.sender.id == local.id {
                  continue; // our own broadcast echoed back
                }
                netin_tx
                  .send(NetworkEvent::PacketReceived {
                    from: blob.sender,
                    packet: blob.packet,
                  })
                  .unwrap();
              }
              Err(e) => debug!("Failed to deserialize gossip payload: {e}"),
            },
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
              connected.insert(Pubkey::from(peer_id));
            }
            SwarmEvent::ConnectionClosed {
              peer_id,
              num_established: 0,
              ..
            } => {
              connected.remove(&Pubkey::from(peer_id));
            }
            _ => {}
          },
          Some(command) = netout_rx.recv() => match command {
            NetworkCommand::Connect(addr) => {
              if let Err(e) = swarm.dial(addr.clone()) {
                error!("Dialing peer {addr} failed: {e}");
              }
            }
            NetworkCommand::Stream { peers, blob } => {
              let payload = bincode::serialize(&blob).unwrap();
              for peer in peers {
                let topic = inbox_topic(&shard_id, &peer);
                publish_or_retry(
                  &mut swarm,
                  &netout_tx,
                  topic,
                  payload.clone(),
                  NetworkCommand::Stream {
                    peers: vec![peer],
                    blob: blob.clone(),
                  },
                );
              }
            }
            NetworkCommand::Broadcast(blob) => {
              let payload = bincode::serialize(&blob).unwrap();
              let topic = broadcast_topic(&shard_id);
              publish_or_retry(
                &mut swarm,
                &netout_tx,
                topic,
                payload,
                NetworkCommand::Broadcast(blob),
              );
            }
          }
        }
      }
    });

    Ok(Self {
      handle,
      netin: netin_rx,
    })
  }

  /// The shareable transport handle.
  pub fn handle(&self) -> NetworkHandle {
    self.handle.clone()
  }

  pub fn connect(&self, addr: Multiaddr) -> Result<(), NetworkError> {
    self
      .handle
      .netout
      .send(NetworkCommand::Connect(addr))
      .map_err(|_| NetworkError::TaskGone)
  }

  pub async fn poll(&mut self) -> Option<NetworkEvent> {
    self.netin.recv().await
  }
}

/// Publishes to a topic, rescheduling the command after a delay when
/// the mesh has no subscribers for it yet.
fn publish_or_retry(
  swarm: &mut Swarm<Gossipsub>,
  netout: &UnboundedSender<NetworkCommand>,
  topic: String,
  payload: Vec<u8>,
  retry: NetworkCommand,
) {
  match swarm
    .behaviour_mut()
    .publish(IdentTopic::new(topic.clone()), payload)
  {
    Ok(_) => {}
    Err(PublishError::InsufficientPeers) => {
      debug!("No peers on {topic} yet, retrying in {PUBLISH_RETRY_DELAY:?}");
      let netout = netout.clone();
      tokio::spawn(async move {
        tokio::time::sleep(PUBLISH_RETRY_DELAY).await;
        let _ = netout.send(retry);
      });
    }
    Err(e) => warn!("Failed to publish on {topic}: {e:?}"),
  }
}
