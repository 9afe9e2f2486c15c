pub mod amount;
pub mod block;
pub mod events;
pub mod hash;
pub mod hex_codec;
pub mod tx;

pub use amount::{Amount, BLOCK_REWARD, GRAINS_PER_AUR};
pub use hash::{sha256, Hash, HASH_LEN};

/// Addresses are 32-byte Ed25519 public keys, used both as identity and
/// as the verification key for transfers.
pub type Address = Hash;
