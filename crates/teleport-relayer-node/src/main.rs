#![doc = include_str!("../README.md")]

use std::{path::PathBuf, sync::Arc, time::Duration};

use alloy::primitives::Address;
use clap::{command, Parser};
use teleport_source_client::EventSourceConfig;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, subscriber::set_global_default};
use tracing_subscriber::filter::EnvFilter;

use crate::{
    app::{create_app, AppConfig, Commitment},
    destination::{DestinationClient, DestinationConfig},
    observer::{Observer, ObserverConfig},
    proof_sink::ProofSinkConfig,
    publisher::{PublishWorker, PublishWorkerConfig, Publisher, PublisherConfig},
    rpc::{RpcConfig, RpcServer},
    shutdown::Shutdown,
    status::StatusBoard,
    store::AppStore,
};

mod app;
mod destination;
mod observer;
mod proof_sink;
mod publisher;
mod rpc;
mod shutdown;
mod status;
mod store;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// RPC server host
    #[arg(long, default_value = "127.0.0.1:5000")]
    rpc_host: String,
    /// Source ledger RPC URL
    #[arg(long, env = "SOURCE_RPC")]
    source_rpc_url: String,
    /// Source ledger RPC user:password (optional)
    #[arg(long, env = "SOURCE_USERPWD")]
    source_rpc_userpwd: Option<String>,
    /// Address of the contract emitting `TeleportInitiated`
    #[arg(long, env = "SOURCE_CONTRACT")]
    source_contract: Address,
    /// First source block to scan when starting from an empty database
    #[arg(long, default_value = "0")]
    start_block: u64,
    /// Confirmation lag in blocks, to address potential reorgs
    #[arg(long, default_value = "1")]
    confirmation_lag: u64,
    /// Maximum number of blocks per `eth_getLogs` request
    #[arg(long, default_value = "1000")]
    max_block_range: u64,
    /// Polling interval in seconds once the source is caught up
    #[arg(long, default_value = "10")]
    poll_interval_secs: u64,
    /// Destination ledger RPC URL
    #[arg(long, env = "DESTINATION_RPC")]
    destination_rpc_url: String,
    /// Address of the Merkle verifier contract
    #[arg(long, env = "VERIFIER_ADDRESS")]
    verifier_address: Address,
    /// Hex private key of the account publishing roots
    #[arg(long, env = "RELAYER_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,
    /// Expected destination chain id (optional)
    #[arg(long, env = "DESTINATION_CHAIN_ID")]
    chain_id: Option<u64>,
    /// Blocks required on top of a root update before it counts as published
    #[arg(long, default_value = "1")]
    confirmations: u64,
    /// Maximum number of submission attempts per root
    #[arg(long, default_value = "5")]
    max_attempts: u32,
    /// Timeout of a single submission attempt in seconds
    #[arg(long, default_value = "120")]
    attempt_timeout_secs: u64,
    /// How long publishing stays suspended after exhausting attempts, in seconds
    #[arg(long, default_value = "300")]
    degraded_cooldown_secs: u64,
    /// Path to the database storing the commitment log and relayer state
    #[arg(long, default_value = "./.relayer_data/relayer.db")]
    db_path: PathBuf,
    /// Output directory for proof JSON files (optional)
    #[arg(long)]
    proofs_dir: Option<PathBuf>,
    /// Number of asset ids per proof shard directory
    #[arg(long, default_value = "10000")]
    proofs_shard_size: u64,
    /// Logging level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber_builder =
        tracing_subscriber::fmt::Subscriber::builder().with_env_filter(env_filter);

    let subscriber = subscriber_builder.with_writer(std::io::stderr).finish();
    if let Err(err) = set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {err}");
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    info!("Teleport relayer is launching...");

    // Opening the single writer before any component starts
    let store = match AppStore::single_atomic_writer(&cli.db_path).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!("Failed to open relayer store {:?}: {}", cli.db_path, err);
            std::process::exit(1);
        }
    };

    let destination_config = DestinationConfig {
        rpc_url: cli.destination_rpc_url,
        verifier: cli.verifier_address,
        private_key: cli.private_key,
        chain_id: cli.chain_id,
        confirmations: cli.confirmations,
        receipt_poll_interval: Duration::from_secs(2),
    };
    let destination = match DestinationClient::connect(destination_config).await {
        Ok(client) => client,
        Err(err) => {
            error!("Failed to connect to the destination ledger: {}", err);
            std::process::exit(1);
        }
    };

    // Instantiating components and wiring them together
    let shutdown = Shutdown::default();
    let status = StatusBoard::default();
    let (tx_commitment, rx_commitment) = watch::channel(Commitment::default());

    let app_config = AppConfig {
        api_requests_capacity: 1000,
        proof_sink: cli.proofs_dir.map(|output_dir| ProofSinkConfig {
            output_dir,
            shard_size: cli.proofs_shard_size,
        }),
    };
    let (mut app_server, app_client) = create_app(
        app_config,
        store.clone(),
        tx_commitment,
        status.clone(),
        shutdown.subscribe(),
    );

    let observer_config = ObserverConfig {
        rpc_url: cli.source_rpc_url,
        rpc_userpwd: cli.source_rpc_userpwd,
        contract: cli.source_contract,
        source: EventSourceConfig {
            start_block: cli.start_block,
            confirmation_lag: cli.confirmation_lag,
            max_block_range: cli.max_block_range,
            poll_interval: Duration::from_secs(cli.poll_interval_secs),
            ..Default::default()
        },
    };
    let mut observer = Observer::new(
        observer_config,
        app_client,
        status.clone(),
        shutdown.subscribe(),
    );

    let publisher_config = PublisherConfig {
        max_attempts: cli.max_attempts,
        attempt_timeout: Duration::from_secs(cli.attempt_timeout_secs),
        ..Default::default()
    };
    let publisher = match Publisher::restore(destination, store, publisher_config).await {
        Ok(publisher) => publisher,
        Err(err) => {
            error!("Failed to restore publisher state: {}", err);
            std::process::exit(1);
        }
    };
    let mut publish_worker = PublishWorker::new(
        publisher,
        PublishWorkerConfig {
            degraded_cooldown: Duration::from_secs(cli.degraded_cooldown_secs),
        },
        rx_commitment.clone(),
        status.clone(),
        shutdown.subscribe(),
    );

    let rpc_config = RpcConfig {
        rpc_host: cli.rpc_host,
        db_path: cli.db_path,
    };
    let rpc_server = RpcServer::new(rpc_config, rx_commitment, status, shutdown.subscribe());

    // Launching threads for each component
    let app_handle = tokio::spawn(async move { app_server.run().await });
    let observer_handle = tokio::spawn(async move { observer.run().await });
    let publish_handle = tokio::spawn(async move { publish_worker.run().await });
    let rpc_handle = tokio::spawn(async move { rpc_server.run().await });
    let shutdown_handle = tokio::spawn(async move { shutdown.run().await });

    // If at least one component exits with an error, the relayer will exit with an error
    match tokio::try_join!(
        flatten(app_handle),
        flatten(observer_handle),
        flatten(publish_handle),
        flatten(rpc_handle),
        flatten(shutdown_handle)
    ) {
        Ok(_) => {
            info!("Teleport relayer has shut down");
            std::process::exit(0);
        }
        Err(_) => {
            error!("Teleport relayer has exited with error");
            std::process::exit(1);
        }
    }
}

async fn flatten<T>(handle: JoinHandle<Result<T, ()>>) -> Result<T, ()> {
    match handle.await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(()),
    }
}
