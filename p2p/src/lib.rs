pub mod message;


use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use blockchain::{Chain, ImportResult};
use mempool::Mempool;

pub use message::{read_message, write_message, Message, MAX_BLOCKS_PER_BATCH, PROTOCOL_VERSION};

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub seed_nodes: Vec<String>,
}

/// The gossip server: maintains framed TCP connections to peers, exchanges
/// handshakes, serves block ranges to nodes catching up, and relays blocks
/// and transactions that were newly accepted locally.
pub struct Server {
    config: ServerConfig,
    chain: Arc<Chain>,
    mempool: Arc<Mempool>,
    peers: RwLock<HashMap<SocketAddr, UnboundedSender<Message>>>,
}

impl Server {
    pub fn new(config: ServerConfig, chain: Arc<Chain>, mempool: Arc<Mempool>) -> Arc<Self> {
        Arc::new(Server {
            config,
            chain,
            mempool,
            peers: RwLock::new(HashMap::new()),
        })
    }

    /// Binds the listener, spawns the accept loop and seed connections,
    /// and returns the bound address.
    pub async fn start(self: Arc<Self>) -> Result<SocketAddr> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "p2p server listening");

        let server = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let server = server.clone();
                        tokio::spawn(async move {
                            server.handle_peer(stream, addr, false).await;
                        });
                    }
                    Err(err) => {
                        warn!(%err, "accept failed");
                    }
                }
            }
        });

        for seed in self.config.seed_nodes.clone() {
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(err) = server.clone().connect(&seed).await {
                    warn!(seed = %seed, %err, "failed to connect to seed");
                }
            });
        }

        Ok(local_addr)
    }

    pub async fn connect(self: Arc<Self>, addr: &str) -> Result<()> {
        let stream = TcpStream::connect(addr).await?;
        let peer_addr = stream.peer_addr()?;
        let server = self.clone();
        tokio::spawn(async move {
            server.handle_peer(stream, peer_addr, true).await;
        });
        Ok(())
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn broadcast(&self, msg: Message) {
        for sender in self.peers.read().await.values() {
            let _ = sender.send(msg.clone());
        }
    }

    async fn broadcast_except(&self, skip: &SocketAddr, msg: Message) {
        for (addr, sender) in self.peers.read().await.iter() {
            if addr != skip {
                let _ = sender.send(msg.clone());
            }
        }
    }

    async fn handle_peer(self: Arc<Self>, stream: TcpStream, addr: SocketAddr, outbound: bool) {
        let (mut read_half, mut write_half) = stream.into_split();
        let (sender, mut outbox) = unbounded_channel::<Message>();

        {
            let mut peers = self.peers.write().await;
            if peers.contains_key(&addr) {
                debug!(%addr, "dropping duplicate peer connection");
                return;
            }
            peers.insert(addr, sender.clone());
        }
        info!(%addr, outbound, "peer connected");

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbox.recv().await {
                if let Err(err) = write_message(&mut write_half, &msg).await {
                    debug!(%err, "peer write ended");
                    break;
                }
            }
        });

        let _ = sender.send(Message::Version {
            version: PROTOCOL_VERSION,
            block_height: self.chain.height(),
            from_addr: self.config.listen_addr.clone(),
        });

        loop {
            match read_message(&mut read_half).await {
                Ok(msg) => self.handle_message(&addr, &sender, msg).await,
                Err(err) => {
                    debug!(%addr, %err, "peer read ended");
                    break;
                }
            }
        }

        self.peers.write().await.remove(&addr);
        writer.abort();
        info!(%addr, "peer disconnected");
    }

    async fn handle_message(&self, addr: &SocketAddr, reply: &UnboundedSender<Message>, msg: Message) {
        match msg {
            Message::Version {
                version,
                block_height,
                ..
            } => {
                debug!(%addr, version, height = block_height, "received version");
                // A taller peer means we are behind: ask for what's missing.
                if block_height > self.chain.height() {
                    let _ = reply.send(Message::GetBlocks {
                        from_height: self.chain.height() + 1,
                    });
                }
            }

            Message::GetBlocks { from_height } => {
                let mut blocks = Vec::new();
                let mut height = from_height;
                while blocks.len() < MAX_BLOCKS_PER_BATCH {
                    match self.chain.get_block_by_height(height) {
                        Ok(block) => {
                            blocks.push(block);
                            height += 1;
                        }
                        Err(_) => break,
                    }
                }
                let _ = reply.send(Message::Blocks { blocks });
            }

            Message::Blocks { blocks } => {
                let batch_len = blocks.len();
                for block in blocks {
                    let height = block.height();
                    if let Err(err) = self.chain.add_block(block) {
                        warn!(%addr, height, %err, "rejected synced block");
                        return;
                    }
                }
                // A full batch usually means there is more where that
                // came from.
                if batch_len == MAX_BLOCKS_PER_BATCH {
                    let _ = reply.send(Message::GetBlocks {
                        from_height: self.chain.height() + 1,
                    });
                }
            }

            Message::Block { block } => match self.chain.add_block(block.clone()) {
                Ok(ImportResult::Imported) => {
                    info!(%addr, height = block.height(), hash = %block.hash, "imported gossiped block");
                    self.broadcast_except(addr, Message::Block { block }).await;
                }
                Ok(ImportResult::AlreadyKnown) => {}
                Err(err) => {
                    debug!(%addr, %err, "rejected gossiped block");
                }
            },

            Message::Tx { tx } => match self.mempool.add_transaction(&tx) {
                Ok(()) => {
                    debug!(%addr, id = %tx.id, "admitted gossiped transaction");
                    self.broadcast_except(addr, Message::Tx { tx }).await;
                }
                Err(err) => {
                    debug!(%addr, %err, "rejected gossiped transaction");
                }
            },
        }
    }
}
