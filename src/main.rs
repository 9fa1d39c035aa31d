mod cli;
mod consensus;
mod engine;
mod handler;
mod metrics;
mod network;
mod primitives;
mod protocol;
mod state;
mod storage;

#[cfg(test)]
mod test;

use {
  clap::Parser,
  cli::{CliOpts, NodeRole},
  consensus::{ApprovalCollector, GenesisApprover},
  engine::{DeterministicEngine, ExecutionEngine},
  handler::{
    spawn_bootstrap_requester,
    spawn_standalone_promotion,
    BootstrapState,
    CasperEnv,
    GenesisValidatorState,
    HandlerState,
    PacketDispatcher,
    StandaloneState,
  },
  network::{Network, NetworkEvent},
  primitives::Keypair,
  state::{CasperRef, LastApprovedBlock},
  std::sync::Arc,
  storage::{BlockStore, DagStore},
  tracing::{error, info, Level},
  tracing_subscriber::{
    filter::filter_fn,
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
    Layer,
  },
};

fn print_essentials(opts: &CliOpts) {
  info!("Starting Caspian validator node");
  info!("Version: {}", env!("CARGO_PKG_VERSION"));
  info!("Role: {:?}", opts.role());
  info!("Shard: {}", opts.shard_id);
  info!("Listen addresses: {:?}", opts.listen_multiaddrs());
  if let Some(keypair) = &opts.keypair {
    info!("Validator identity: {}", keypair);
  }
  info!("Data directory: {}", opts.data_dir.display());
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
  let opts = CliOpts::parse();

  let loglevel = match opts.verbose {
    1 => Level::DEBUG,
    2 => Level::TRACE,
    _ => Level::INFO,
  };
  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer().with_filter(filter_fn(
      move |metadata| metadata.level() <= &loglevel,
    )))
    .init();

  print_essentials(&opts);
  metrics::describe();

  // the network identity is the validator keypair when the node has
  // one, otherwise an ephemeral key good for this process lifetime.
  let identity = match &opts.keypair {
    Some(keypair) => keypair.clone(),
    None => Keypair::unique(),
  };

  // The P2P networking layer. Runs on its own task and emits
  // received packets through .poll()
  let mut network = Network::new(
    opts.shard_id.clone(),
    identity,
    opts.listen_multiaddrs().into_iter(),
  )
  .await?;

  // connect to bootstrap nodes if specified
  for peer in opts.peers() {
    network.connect(peer)?;
  }

  let transport = Arc::new(network.handle());
  let block_store = BlockStore::new(opts.data_dir.clone())?;
  let dag_store = Arc::new(DagStore::default());
  let engine: Arc<dyn ExecutionEngine> = Arc::new(DeterministicEngine::new());

  let env = Arc::new(CasperEnv {
    transport: transport.clone(),
    block_store,
    dag_store,
    engine: engine.clone(),
    last_approved: LastApprovedBlock::empty(),
    casper_ref: CasperRef::empty(),
    shard_id: opts.shard_id.clone(),
    validator: opts.keypair.clone(),
    required_sigs: opts.required_sigs,
  });

  // choose the initial lifecycle state from the configured role and
  // start the background tasks that drive it.
  let initial = match opts.role() {
    NodeRole::ApproveGenesis => {
      let validator = opts
        .keypair
        .clone()
        .ok_or_else(|| anyhow::anyhow!("--approve-genesis needs --keypair"))?;
      let params = opts.genesis_params()?;
      engine.set_bonds(&params.bonds).await?;
      HandlerState::GenesisValidator(GenesisValidatorState {
        approver: GenesisApprover::new(validator.clone(), &params),
        validator,
      })
    }
    NodeRole::Standalone => {
      let params = opts.genesis_params()?;
      engine.set_bonds(&params.bonds).await?;

      let candidate = consensus::genesis::build_candidate(&params);
      let genesis = candidate.block.clone();
      info!("Constructed genesis candidate {}", genesis);
      let transforms = engine
        .effects_for_block(&genesis, &env.dag_store.representation())
        .await?;

      let collector = Arc::new(ApprovalCollector::new(
        candidate,
        transforms,
        opts.approve_duration,
        opts.approve_interval,
        env.last_approved.clone(),
      ));
      if let Some(keypair) = &opts.keypair {
        collector.approve_own(keypair);
      }
      tokio::spawn(Arc::clone(&collector).run(transport.clone()));
      HandlerState::Standalone(StandaloneState { collector })
    }
    NodeRole::Default => HandlerState::Bootstrap(BootstrapState {
      known_validators: opts.known_validators()?,
    }),
  };

  let role = opts.role();
  let dispatcher = Arc::new(PacketDispatcher::new(Arc::clone(&env), initial));
  match role {
    NodeRole::Standalone => {
      spawn_standalone_promotion(
        Arc::clone(&env),
        dispatcher.cell(),
        opts.approve_interval,
      );
    }
    NodeRole::Default => {
      spawn_bootstrap_requester(
        Arc::clone(&env),
        dispatcher.cell(),
        opts.bootstrap_request_delay,
      );
    }
    NodeRole::ApproveGenesis => {}
  }

  // packet runloop: every received packet is dispatched on its own
  // task so slow collaborators never stall the transport.
  while let Some(event) = network.poll().await {
    let NetworkEvent::PacketReceived { from, packet } = event;
    let dispatcher = Arc::clone(&dispatcher);
    tokio::spawn(async move {
      if let Err(e) = dispatcher.handle(&from, packet).await {
        error!("Failed to handle a packet from {from}: {e}");
      }
    });
  }

  Ok(())
}
