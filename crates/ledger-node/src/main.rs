mod api;
mod constants;
mod coordinator;
mod hub;
mod miner;
mod role;
mod shutdown;

use anyhow::Context;
use api::AppState;
use clap::{Parser, Subcommand};
use constants::{DEFAULT_COORDINATOR_URL, MINER_ADDRESS_BYTES, UPSTREAM_QUEUE_CAPACITY};
use coordinator::Coordinator;
use hub::ClientHub;
use ledger_core::{
    constants::POW_TARGET_DIFFICULTY,
    mining::{MinerConfig, MiningLoop},
    ConsensusParams, SharedBlockchain,
};
use ledger_storage::{persist_events, restore_chain, sled_store::SledStore};
use miner::{forward_events, run_upstream, MinerBroadcaster, MinerNode};
use role::NodeRole;
use shutdown::ShutdownController;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ledger-node", about = "Proof-of-work ledger node")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080", global = true)]
    listen: String,

    /// Data directory for the sled chain snapshot; the chain lives in
    /// memory only when omitted
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Leading zero hex digits required of every block hash
    #[arg(long, default_value_t = POW_TARGET_DIFFICULTY, global = true)]
    difficulty: usize,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Keep the longest chain and relay it to miners
    Coordinator,
    /// Mine blocks and sync with a coordinator
    Miner {
        /// WebSocket URL of the coordinator
        #[arg(long, default_value = DEFAULT_COORDINATOR_URL)]
        coordinator: String,
        /// Reward address; a random one is generated when omitted
        #[arg(long)]
        address: Option<String>,
        /// Search nonces on every core
        #[arg(long)]
        parallel: bool,
    },
}

fn random_address() -> String {
    hex::encode(rand::random::<[u8; MINER_ADDRESS_BYTES]>())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let chain = SharedBlockchain::new(ConsensusParams::default().with_difficulty(args.difficulty));
    let shutdown = ShutdownController::new();
    let mut tasks = Vec::new();

    if let Some(dir) = &args.data_dir {
        let store = Arc::new(SledStore::open(dir)?);
        restore_chain(store.as_ref(), &chain).context("restoring stored chain")?;
        tasks.push(tokio::spawn(persist_events(
            store,
            chain.clone(),
            shutdown.subscribe(),
        )));
    }

    let hub = ClientHub::new();
    let role: Arc<dyn NodeRole> = match args.role {
        Role::Coordinator => Arc::new(Coordinator::new(chain.clone(), hub.clone())),
        Role::Miner {
            coordinator,
            address,
            parallel,
        } => {
            let address = address.unwrap_or_else(random_address);
            info!(%address, "mining rewards go to this address");
            let (upstream_tx, upstream_rx) = mpsc::channel(UPSTREAM_QUEUE_CAPACITY);
            let mining = MiningLoop::new(
                chain.clone(),
                Arc::new(MinerBroadcaster::new(upstream_tx, hub.clone())),
                MinerConfig { address, parallel },
                false,
            );
            let node = Arc::new(MinerNode::new(chain.clone(), mining.handle()));
            tasks.push(tokio::spawn(mining.run(shutdown.subscribe())));
            tasks.push(tokio::spawn(run_upstream(
                coordinator,
                node.clone(),
                upstream_rx,
                shutdown.subscribe(),
            )));
            tasks.push(tokio::spawn(forward_events(
                chain.clone(),
                hub.clone(),
                shutdown.subscribe(),
            )));
            node
        }
    };

    let signals = shutdown.clone();
    tokio::spawn(async move { signals.wait_for_signal().await });

    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", args.listen))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(role = role.name(), difficulty = args.difficulty, "ledger-node listening on http://{addr}");

    let mut stop = shutdown.subscribe();
    let app = api::router(AppState { role, hub });
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = stop.recv().await;
        })
        .await;

    shutdown.shutdown();
    for task in tasks {
        let _ = task.await;
    }
    info!("ledger-node stopped");
    served.context("http server failed")
}
