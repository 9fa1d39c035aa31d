use {
  crate::{
    consensus::{genesis, Bond, GenesisError, GenesisParams, Wallet},
    primitives::{Keypair, Pubkey},
  },
  clap::Parser,
  libp2p::{multiaddr::Protocol, Multiaddr},
  std::{
    collections::HashSet,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
  },
  tracing::info,
};

/// The lifecycle role this node starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
  /// Participates in the genesis ceremony by signing the candidate
  /// it was configured for.
  ApproveGenesis,
  /// Constructs the genesis block and collects approvals for it.
  Standalone,
  /// Bootstraps by requesting the approved block from peers.
  Default,
}

#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct CliOpts {
  #[clap(long, help = "construct the genesis block and collect approvals")]
  pub standalone: bool,

  #[clap(
    long,
    help = "participate in the genesis ceremony as an approving validator",
    conflicts_with = "standalone"
  )]
  pub approve_genesis: bool,

  #[clap(
    long,
    help = "identifier of the shard this node participates in",
    default_value = "caspian"
  )]
  pub shard_id: String,

  #[clap(short, long, help = "secret key of the validator account")]
  pub keypair: Option<Keypair>,

  #[clap(
    long,
    help = "listen address of the validator",
    default_value = "0.0.0.0"
  )]
  pub addr: Vec<IpAddr>,

  #[clap(long, help = "listen port of the validator", default_value = "44668")]
  pub port: u16,

  #[clap(
    short,
    long,
    parse(from_occurrences),
    help = "Use verbose output (-vv very verbose output)"
  )]
  pub verbose: u64,

  #[clap(
    long,
    help = "address of a known peer to bootstrap p2p networking from"
  )]
  pub peer: Vec<SocketAddr>,

  #[clap(
    long,
    parse(from_os_str),
    help = "directory for node storage",
    default_value = "./data"
  )]
  pub data_dir: PathBuf,

  #[clap(
    long,
    parse(from_os_str),
    help = "directory for genesis ceremony artifacts",
    default_value = "./genesis"
  )]
  pub genesis_path: PathBuf,

  #[clap(long, parse(from_os_str), help = "path to the genesis bonds file")]
  pub bonds_file: Option<PathBuf>,

  #[clap(long, parse(from_os_str), help = "path to the genesis wallets file")]
  pub wallets_file: Option<PathBuf>,

  #[clap(
    long,
    parse(from_os_str),
    help = "path to the file listing trusted genesis validators, one \
            base58 public key per line"
  )]
  pub known_validators_file: Option<PathBuf>,

  #[clap(
    long,
    help = "timestamp of the genesis block in milliseconds; ceremony \
            participants must agree on this value"
  )]
  pub deploy_timestamp: Option<i64>,

  #[clap(
    long,
    help = "number of validators to autogenerate bonds for when no \
            bonds file is given",
    default_value = "5"
  )]
  pub num_validators: usize,

  #[clap(long, help = "smallest allowed bond stake", default_value = "1")]
  pub minimum_bond: u64,

  #[clap(
    long,
    help = "largest allowed bond stake",
    default_value = "18446744073709551615"
  )]
  pub maximum_bond: u64,

  #[clap(long, help = "include a test token faucet in the genesis block")]
  pub has_faucet: bool,

  #[clap(
    long,
    help = "validator signatures required before the genesis candidate \
            counts as approved",
    default_value = "0"
  )]
  pub required_sigs: u32,

  #[clap(
    long,
    parse(try_from_str = humantime::parse_duration),
    help = "how long the genesis ceremony keeps collecting approvals",
    default_value = "5m"
  )]
  pub approve_duration: Duration,

  #[clap(
    long,
    parse(try_from_str = humantime::parse_duration),
    help = "how often the genesis candidate is recirculated and the \
            approval slot is polled",
    default_value = "5s"
  )]
  pub approve_interval: Duration,

  #[clap(
    long,
    parse(try_from_str = humantime::parse_duration),
    help = "delay between approved block requests while bootstrapping",
    default_value = "10s"
  )]
  pub bootstrap_request_delay: Duration,
}

impl CliOpts {
  pub fn role(&self) -> NodeRole {
    if self.approve_genesis {
      NodeRole::ApproveGenesis
    } else if self.standalone {
      NodeRole::Standalone
    } else {
      NodeRole::Default
    }
  }

  /// Lists all the multiaddresses this node will listen
  /// on for incoming connections. By default it will listen
  /// on all available interfaces.
  pub fn listen_multiaddrs(&self) -> Vec<Multiaddr> {
    self
      .addr
      .iter()
      .map(|addr| {
        let mut maddr = Multiaddr::empty();
        maddr.push(match *addr {
          IpAddr::V4(addr) => Protocol::Ip4(addr),
          IpAddr::V6(addr) => Protocol::Ip6(addr),
        });
        maddr.push(Protocol::Tcp(self.port));
        maddr
      })
      .collect()
  }

  /// Lists all multiaddresses of known peers of the shard. Those
  /// peers are used as first bootstrap nodes to join the p2p gossip
  /// network.
  pub fn peers(&self) -> Vec<Multiaddr> {
    self
      .peer
      .iter()
      .map(|addr| {
        let mut maddr = Multiaddr::empty();
        maddr.push(match *addr {
          SocketAddr::V4(addr) => Protocol::Ip4(*addr.ip()),
          SocketAddr::V6(addr) => Protocol::Ip6(*addr.ip()),
        });
        maddr.push(Protocol::Tcp(addr.port()));
        maddr
      })
      .collect()
  }

  /// Assembles the genesis parameters from the configured files,
  /// autogenerating a bond table when none was supplied.
  pub fn genesis_params(&self) -> Result<GenesisParams, GenesisError> {
    let bonds = self.bonds()?;
    genesis::check_bonds(&bonds, self.minimum_bond, self.maximum_bond)?;
    let wallets = self.wallets()?;
    Ok(GenesisParams {
      shard_id: self.shard_id.clone(),
      timestamp: self
        .deploy_timestamp
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
      bonds,
      wallets,
      minimum_bond: self.minimum_bond,
      maximum_bond: self.maximum_bond,
      has_faucet: self.has_faucet,
      required_sigs: self.required_sigs,
    })
  }

  fn bonds(&self) -> Result<Vec<Bond>, GenesisError> {
    match &self.bonds_file {
      Some(path) => genesis::read_bonds(path),
      None => {
        info!(
          "No bonds file given, generating {} validators under {}",
          self.num_validators,
          self.genesis_path.display()
        );
        genesis::generate_bonds(
          &self.genesis_path,
          self.num_validators,
          self.minimum_bond,
        )
      }
    }
  }

  fn wallets(&self) -> Result<Vec<Wallet>, GenesisError> {
    match &self.wallets_file {
      Some(path) => genesis::read_wallets(path),
      None => Ok(vec![]),
    }
  }

  /// The set of validators a bootstrapping node trusts to have
  /// signed the shard's approved block.
  pub fn known_validators(&self) -> Result<HashSet<Pubkey>, GenesisError> {
    match &self.known_validators_file {
      Some(path) => genesis::read_known_validators(path),
      None => Ok(HashSet::new()),
    }
  }
}
