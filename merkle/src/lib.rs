//! SHA-256 binary merkle tree over transaction ids.
//!
//! Each level hashes the concatenation of child pairs; an unpaired tail
//! element is duplicated. An empty list yields the zero hash, and a single
//! element is its own root.

use types::hash::{sha256, Hash, HASH_LEN};
use types::tx::Transaction;

/// Root over the ids of an ordered transaction list.
pub fn merkle_root(txs: &[Transaction]) -> Hash {
    let ids: Vec<Hash> = txs.iter().map(|tx| tx.id).collect();
    merkle_root_of_ids(&ids)
}

/// Root over pre-collected leaf hashes.
pub fn merkle_root_of_ids(ids: &[Hash]) -> Hash {
    if ids.is_empty() {
        return Hash::ZERO;
    }

    let mut level = ids.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(hash_pair(left, right));
        }
        level = next;
    }

    level[0]
}

pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut combined = [0u8; HASH_LEN * 2];
    combined[..HASH_LEN].copy_from_slice(left.as_bytes());
    combined[HASH_LEN..].copy_from_slice(right.as_bytes());
    sha256(&combined)
}
