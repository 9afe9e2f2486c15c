mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use blockchain::{BlockChainError, BlockStore, Chain};
use mempool::Mempool;
use miner::Miner;
use p2p::{Message, Server as P2pServer, ServerConfig};
use rpc::{start_rpc_server, ApiState};
use storage::SledDB;
use types::events::LocalEvent;
use types::tx::{Transaction, TxKind};
use types::{Address, Hash};

use crate::config::NetworkConfig;

#[derive(Parser)]
#[command(name = "aurumd", version, about = "Aurum proof-of-work node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a validating node.
    Run {
        /// P2P listen address.
        #[arg(long, default_value = "0.0.0.0:9000")]
        addr: String,
        /// Seed node to connect to.
        #[arg(long)]
        seed: Option<String>,
        /// RPC listen address.
        #[arg(long, default_value = "127.0.0.1:8080")]
        rpc: String,
        /// Data directory.
        #[arg(long, default_value = "data")]
        datadir: PathBuf,
    },
    /// Run a mining node.
    Mine {
        /// Address receiving mining rewards (hex).
        #[arg(long)]
        reward_addr: String,
        #[arg(long, default_value = "0.0.0.0:9001")]
        addr: String,
        #[arg(long)]
        seed: Option<String>,
        #[arg(long, default_value = "127.0.0.1:8081")]
        rpc: String,
        #[arg(long, default_value = "data_miner")]
        datadir: PathBuf,
    },
    /// Generate a new wallet key.
    Wallet {
        /// File the key is written to.
        #[arg(long, default_value = "wallet.dat")]
        file: PathBuf,
    },
    /// Query an address balance from a running node.
    Balance {
        #[arg(long)]
        addr: String,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        rpc_url: String,
    },
    /// Sign and submit a transfer through a running node.
    Send {
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
        #[arg(long, default_value_t = 100)]
        fee: u64,
        /// Private key file.
        #[arg(long, default_value = "wallet.dat")]
        key: PathBuf,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        rpc_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Run {
            addr,
            seed,
            rpc,
            datadir,
        } => start_node(addr, seed, rpc, datadir, None).await,
        Command::Mine {
            reward_addr,
            addr,
            seed,
            rpc,
            datadir,
        } => {
            let reward = Hash::from_hex(&reward_addr).context("invalid reward address")?;
            start_node(addr, seed, rpc, datadir, Some(reward)).await
        }
        Command::Wallet { file } => handle_wallet(file),
        Command::Balance { addr, rpc_url } => handle_balance(&rpc_url, &addr).await,
        Command::Send {
            to,
            amount,
            fee,
            key,
            rpc_url,
        } => handle_send(&rpc_url, &key, &to, amount, fee).await,
    }
}

async fn start_node(
    listen_addr: String,
    seed: Option<String>,
    rpc_addr: String,
    datadir: PathBuf,
    reward: Option<Address>,
) -> Result<()> {
    let network = NetworkConfig::testnet();
    info!(network = network.name, mining = reward.is_some(), "starting aurum node");

    // The full dataset only pays off when the node actually mines.
    let hasher = consensus::new_hasher(&network.hasher_seed, reward.is_some());

    let db = Arc::new(SledDB::new(&datadir).context("failed to open data directory")?);
    let store = Arc::new(BlockStore::new(db));
    let chain = Arc::new(Chain::new(store, hasher.clone())?);

    match chain.init_genesis(
        network.genesis_miner,
        network.initial_difficulty,
        network.genesis_timestamp,
    ) {
        Ok(genesis) => info!(hash = %genesis.hash, "genesis block created"),
        Err(err)
            if err.downcast_ref::<BlockChainError>()
                == Some(&BlockChainError::AlreadyInitialized) =>
        {
            info!(height = chain.height(), "chain restored from disk");
        }
        Err(err) => return Err(err),
    }

    let pool = Arc::new(Mempool::new(chain.clone()));
    chain.set_mempool(pool.clone());

    let mut seed_nodes = network.seed_nodes;
    seed_nodes.extend(seed);
    let p2p_server = P2pServer::new(
        ServerConfig {
            listen_addr,
            seed_nodes,
        },
        chain.clone(),
        pool.clone(),
    );
    p2p_server.clone().start().await?;

    let (events_tx, mut events_rx) = unbounded_channel::<LocalEvent>();

    let api_state = ApiState {
        chain: chain.clone(),
        mempool: pool.clone(),
        network: p2p_server.clone(),
        events: events_tx.clone(),
    };
    let rpc_socket: SocketAddr = rpc_addr.parse().context("invalid rpc address")?;
    tokio::spawn(async move {
        if let Err(err) = start_rpc_server(api_state, rpc_socket).await {
            error!(%err, "rpc server stopped");
        }
    });

    let block_miner = reward.map(|reward_address| {
        let block_miner = Miner::new(
            chain.clone(),
            hasher.clone(),
            pool.clone(),
            reward_address,
            events_tx.clone(),
        );
        block_miner.start();
        block_miner
    });

    loop {
        tokio::select! {
            event = events_rx.recv() => match event {
                Some(LocalEvent::MinedBlock(block)) => {
                    p2p_server.broadcast(Message::Block { block }).await;
                }
                Some(LocalEvent::SubmittedTransaction(tx)) => {
                    p2p_server.broadcast(Message::Tx { tx }).await;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    if let Some(block_miner) = block_miner {
        block_miner.stop();
    }
    hasher.close();
    Ok(())
}

fn handle_wallet(file: PathBuf) -> Result<()> {
    let key = wallet::generate_key();
    wallet::save_key(&file, &key)?;
    println!("Generated new keypair.");
    println!("Private key saved to: {}", file.display());
    println!("Address: {}", wallet::address_of(&key));
    Ok(())
}

#[derive(Deserialize)]
struct BalanceResponse {
    nonce: u64,
}

async fn handle_balance(rpc_url: &str, addr: &str) -> Result<()> {
    let body = reqwest::get(format!("{rpc_url}/balance?addr={addr}"))
        .await?
        .text()
        .await?;
    println!("{body}");
    Ok(())
}

async fn handle_send(rpc_url: &str, key_file: &PathBuf, to: &str, amount: u64, fee: u64) -> Result<()> {
    let key = wallet::load_key(key_file)?;
    let from = wallet::address_of(&key);

    // The confirmed nonce is the count of sent transfers, which is exactly
    // the next nonce to use when nothing else is pending.
    let state: BalanceResponse = reqwest::get(format!("{rpc_url}/balance?addr={from}"))
        .await?
        .json()
        .await?;

    let mut tx = Transaction {
        id: Hash::ZERO,
        kind: TxKind::Transfer,
        timestamp: Utc::now().timestamp() as u64,
        from,
        to: Hash::from_hex(to).context("invalid recipient address")?,
        amount,
        fee,
        nonce: state.nonce,
        signature: Vec::new(),
    };
    wallet::sign_transaction(&mut tx, &key);
    tx.id = tx.compute_id();

    let payload = serde_json::json!({
        "from": from.hex(),
        "to": to,
        "amount": amount,
        "fee": fee,
        "nonce": tx.nonce,
        "signature": hex::encode(&tx.signature),
        "timestamp": tx.timestamp,
    });

    let response = reqwest::Client::new()
        .post(format!("{rpc_url}/tx"))
        .json(&payload)
        .send()
        .await?;
    println!("{}", response.text().await?);
    Ok(())
}
