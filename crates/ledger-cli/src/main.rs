use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledger_core::{Ed25519Signer, Signer, Transaction};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the minimal ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign a transfer locally and submit it
    Submit {
        /// Hex-encoded 32-byte Ed25519 secret key of the sender
        #[arg(long)]
        key: String,
        /// Recipient identity
        #[arg(long)]
        to: String,
        /// Amount
        #[arg(long)]
        amount: u64,
    },
    /// Mine the node's pending pool, paying the reward to `miner`
    Mine {
        #[arg(long)]
        miner: String,
    },
    /// Show the balance of an identity
    Balance { principal: String },
    /// Print the node's full chain
    Chain,
    /// Register peer nodes
    Register {
        #[arg(required = true)]
        peers: Vec<String>,
    },
    /// Ask the node to reconcile with its peers
    Resolve,
}

#[derive(Serialize)]
struct MineRequest {
    miner: String,
}

#[derive(Serialize)]
struct RegisterRequest {
    nodes: Vec<String>,
}

async fn send(request: RequestBuilder) -> Result<()> {
    let res = request.send().await.context("node unreachable")?;
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/');
    let client = Client::new();
    match cli.cmd {
        Command::Submit { key, to, amount } => {
            let signer = Ed25519Signer::from_hex(&key).context("parsing --key")?;
            let mut tx = Transaction::new(signer.identity(), to, amount);
            tx.sign(&signer)?;
            debug!(hash = %tx.content_hash(), "signed transaction");
            send(client.post(format!("{node}/transactions")).json(&tx)).await?;
        }
        Command::Mine { miner } => {
            send(client.post(format!("{node}/mine")).json(&MineRequest { miner })).await?;
        }
        Command::Balance { principal } => {
            send(client.get(format!("{node}/balance/{principal}"))).await?;
        }
        Command::Chain => {
            send(client.get(format!("{node}/chain"))).await?;
        }
        Command::Register { peers } => {
            let req = RegisterRequest { nodes: peers };
            send(client.post(format!("{node}/nodes/register")).json(&req)).await?;
        }
        Command::Resolve => {
            send(client.get(format!("{node}/nodes/resolve"))).await?;
        }
    }
    Ok(())
}
