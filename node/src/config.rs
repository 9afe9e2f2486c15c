use types::{Address, Hash};

/// Network-wide parameters shared by every node on a network.
pub struct NetworkConfig {
    pub name: &'static str,
    /// Fixed so independently started nodes derive the same genesis block.
    pub genesis_timestamp: u64,
    /// Genesis difficulty. Zero lets the fixed-nonce genesis validate
    /// everywhere; the retarget rule lifts difficulty once a full window
    /// of mined history exists.
    pub initial_difficulty: u64,
    pub genesis_miner: Address,
    /// Seed for the memory-hard hasher.
    pub hasher_seed: [u8; 32],
    pub seed_nodes: Vec<String>,
}

impl NetworkConfig {
    pub fn testnet() -> Self {
        NetworkConfig {
            name: "aurum-testnet-v1",
            // 2025-01-01T00:00:00Z
            genesis_timestamp: 1_735_689_600,
            initial_difficulty: 0,
            genesis_miner: Hash::ZERO,
            hasher_seed: [0u8; 32],
            seed_nodes: Vec::new(),
        }
    }
}
