mod peers;
mod routes;

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use clap::Parser;
use ledger_core::{
    constants::{
        DEFAULT_BLOCK_SIZE, DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD,
        DEFAULT_MIN_PENDING_TRANSACTIONS,
    },
    Ledger, LedgerConfig,
};
use ledger_storage::{sled_store::SledStore, Storage};
use tracing::{info, Level};

use crate::routes::{router, AppState};

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Data directory for sled
    #[arg(long, default_value = "./data")]
    data_dir: String,

    /// Leading zero hex digits required of a mined block hash
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u32,

    #[arg(long, default_value_t = DEFAULT_MINING_REWARD)]
    mining_reward: u64,

    /// Maximum transactions per block
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Minimum pending transactions before mining is allowed
    #[arg(long, default_value_t = DEFAULT_MIN_PENDING_TRANSACTIONS)]
    min_pending: usize,

    /// Search nonces on all cores
    #[arg(long)]
    parallel_mining: bool,

    /// Peer node to reconcile with (host:port or URL); repeatable
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Timeout for fetching a peer's chain
    #[arg(long, default_value_t = 5)]
    peer_timeout_secs: u64,
}

impl Args {
    fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
            block_size: self.block_size,
            min_pending_transactions: self.min_pending,
            parallel_mining: self.parallel_mining,
        }
    }
}

/// Restores the chain from `store`, or seeds the store with a fresh genesis.
fn open_ledger(config: LedgerConfig, store: &SledStore) -> anyhow::Result<Ledger> {
    let chain = store.load_chain()?;
    if chain.is_empty() {
        let ledger = Ledger::new(config)?;
        store.replace_chain(ledger.chain())?;
        info!("initialized new chain with genesis {}", ledger.last_block().hash);
        return Ok(ledger);
    }
    let ledger = Ledger::from_chain(config, chain).context("stored chain failed validation")?;
    info!(height = ledger.len() - 1, "restored chain from disk");
    Ok(ledger)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let store = SledStore::open(&args.data_dir)?;
    let mut ledger = open_ledger(args.ledger_config(), &store)?;
    for peer in &args.peers {
        ledger.register_peer(peer)?;
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.peer_timeout_secs))
        .build()?;
    let app = router(AppState::new(ledger, Some(store.clone()), http));

    let addr: SocketAddr = args.listen.parse()?;
    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    store.close()?;
    Ok(())
}
