use std::sync::Arc;

use chrono::Utc;
use ed25519_dalek::{Signer, SigningKey};

use blockchain::{BlockChainError, BlockStore, Chain};
use consensus::{meets_difficulty, next_required_difficulty, Hasher, Sha256dHasher};
use storage::MemStore;
use types::block::{Block, BlockHeader};
use types::tx::{Transaction, TxKind};
use types::{Address, Hash, GRAINS_PER_AUR};

use crate::{Mempool, MempoolError};

fn addr(byte: u8) -> Address {
    let mut bytes = [0u8; 32];
    bytes[0] = byte;
    Hash::from(bytes)
}

fn test_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

fn key_address(key: &SigningKey) -> Address {
    Hash::from(key.verifying_key().to_bytes())
}

fn base_timestamp() -> u64 {
    Utc::now().timestamp() as u64 - 200 * 3600
}

fn signed_transfer(
    key: &SigningKey,
    to: Address,
    amount: u64,
    fee: u64,
    nonce: u64,
    timestamp: u64,
) -> Transaction {
    let mut tx = Transaction {
        id: Hash::ZERO,
        kind: TxKind::Transfer,
        timestamp,
        from: key_address(key),
        to,
        amount,
        fee,
        nonce,
        signature: Vec::new(),
    };
    tx.signature = key.sign(&tx.canonical_bytes()).to_bytes().to_vec();
    tx.id = tx.compute_id();
    tx
}

fn build_child(
    chain: &Chain,
    parent: &Block,
    miner: Address,
    extra_txs: Vec<Transaction>,
    timestamp: u64,
) -> Block {
    let hasher = Sha256dHasher::new();
    let height = parent.height() + 1;

    let mut txs = vec![Transaction::coinbase(miner, height, timestamp)];
    txs.extend(extra_txs);

    let difficulty =
        next_required_difficulty(Some(parent), |h| chain.ancestor_at_height(parent, h)).unwrap();

    let mut header = BlockHeader {
        version: 1,
        height,
        timestamp,
        prev_hash: parent.hash,
        merkle_root: merkle::merkle_root(&txs),
        difficulty,
        nonce: 0,
    };

    loop {
        let pow = hasher.hash(&header.encode_bytes()).unwrap();
        if meets_difficulty(&pow, difficulty) {
            return Block {
                header,
                transactions: txs,
                hash: header.hash(),
                pow_hash: pow,
            };
        }
        header.nonce += 1;
    }
}

fn init_genesis_at(chain: &Chain, miner: Address, difficulty: u64, timestamp: u64) -> Block {
    for ts in timestamp..timestamp + 2000 {
        match chain.init_genesis(miner, difficulty, ts) {
            Ok(block) => return block,
            Err(err) => match err.downcast_ref::<BlockChainError>() {
                Some(BlockChainError::InvalidPoW) => continue,
                _ => panic!("unexpected genesis failure: {err}"),
            },
        }
    }
    panic!("no genesis timestamp satisfied difficulty {difficulty}");
}

/// Chain whose genesis coinbase pays `funded`, extended far enough for
/// that reward to mature: `funded` ends up with 1 AUR at nonce 0.
fn funded_chain(funded: Address, difficulty: u64) -> (Arc<Chain>, u64) {
    let store = Arc::new(BlockStore::new(Arc::new(MemStore::new())));
    let chain = Arc::new(Chain::new(store, Arc::new(Sha256dHasher::new())).unwrap());

    let genesis = init_genesis_at(&chain, funded, difficulty, base_timestamp());
    let g_ts = genesis.header.timestamp;

    let mut parent = genesis;
    for i in 1..=24u64 {
        let child = build_child(&chain, &parent, addr(0xee), vec![], g_ts + i * 3600);
        chain.add_block(child.clone()).unwrap();
        parent = child;
    }

    (chain, g_ts)
}

#[test]
fn admits_valid_transfer() {
    let key = test_key();
    let (chain, g_ts) = funded_chain(key_address(&key), 0);
    let pool = Mempool::new(chain);

    let tx = signed_transfer(&key, addr(0x02), 1_000, 10, 0, g_ts + 1);
    pool.add_transaction(&tx).unwrap();
    assert_eq!(pool.size(), 1);
}

#[test]
fn rejects_duplicate() {
    let key = test_key();
    let (chain, g_ts) = funded_chain(key_address(&key), 0);
    let pool = Mempool::new(chain);

    let tx = signed_transfer(&key, addr(0x02), 1_000, 10, 0, g_ts + 1);
    pool.add_transaction(&tx).unwrap();

    let err = pool.add_transaction(&tx).unwrap_err();
    assert_eq!(
        err.downcast_ref::<MempoolError>(),
        Some(&MempoolError::AlreadyPresent)
    );
}

#[test]
fn rejects_tampered_signature() {
    let key = test_key();
    let (chain, g_ts) = funded_chain(key_address(&key), 0);
    let pool = Mempool::new(chain);

    let mut tx = signed_transfer(&key, addr(0x02), 1_000, 10, 0, g_ts + 1);
    tx.signature[0] ^= 0xff;

    let err = pool.add_transaction(&tx).unwrap_err();
    assert_eq!(
        err.downcast_ref::<MempoolError>(),
        Some(&MempoolError::InvalidSignature)
    );
    assert_eq!(pool.size(), 0);
}

#[test]
fn rejects_coinbase_submission() {
    let key = test_key();
    let (chain, g_ts) = funded_chain(key_address(&key), 0);
    let pool = Mempool::new(chain);

    let coinbase = Transaction::coinbase(addr(0x02), 25, g_ts + 1);
    let err = pool.add_transaction(&coinbase).unwrap_err();
    assert_eq!(
        err.downcast_ref::<MempoolError>(),
        Some(&MempoolError::InvalidSignature)
    );
}

#[test]
fn nonce_must_be_strictly_sequential() {
    let key = test_key();
    let (chain, g_ts) = funded_chain(key_address(&key), 0);
    let pool = Mempool::new(chain);

    let tx_a = signed_transfer(&key, addr(0x02), 1_000, 0, 0, g_ts + 1);
    pool.add_transaction(&tx_a).unwrap();

    // A gap is rejected even though nonce 1 is still free.
    let tx_b = signed_transfer(&key, addr(0x02), 1_000, 0, 2, g_ts + 2);
    let err = pool.add_transaction(&tx_b).unwrap_err();
    assert_eq!(
        err.downcast_ref::<MempoolError>(),
        Some(&MempoolError::InvalidNonce { expected: 1, got: 2 })
    );

    // The next-in-line nonce is accepted while its predecessor is pending.
    let tx_c = signed_transfer(&key, addr(0x02), 1_000, 0, 1, g_ts + 3);
    pool.add_transaction(&tx_c).unwrap();
    assert_eq!(pool.size(), 2);
}

#[test]
fn pending_spend_counts_against_balance() {
    let key = test_key();
    let (chain, g_ts) = funded_chain(key_address(&key), 0);
    let pool = Mempool::new(chain);

    // Balance is exactly 1 AUR. 0.7 then 0.4 must not both fit.
    let tx1 = signed_transfer(&key, addr(0x02), 7 * GRAINS_PER_AUR / 10, 0, 0, g_ts + 1);
    pool.add_transaction(&tx1).unwrap();

    let tx2 = signed_transfer(&key, addr(0x02), 4 * GRAINS_PER_AUR / 10, 0, 1, g_ts + 2);
    let err = pool.add_transaction(&tx2).unwrap_err();
    assert_eq!(
        err.downcast_ref::<MempoolError>(),
        Some(&MempoolError::InsufficientFunds)
    );
}

#[test]
fn listing_is_ordered_and_bounded() {
    let key = test_key();
    let (chain, g_ts) = funded_chain(key_address(&key), 0);
    let pool = Mempool::new(chain);

    // Later nonces carry earlier timestamps to prove ordering is by time.
    let tx0 = signed_transfer(&key, addr(0x02), 100, 0, 0, g_ts + 30);
    let tx1 = signed_transfer(&key, addr(0x02), 100, 0, 1, g_ts + 20);
    let tx2 = signed_transfer(&key, addr(0x02), 100, 0, 2, g_ts + 10);
    pool.add_transaction(&tx0).unwrap();
    pool.add_transaction(&tx1).unwrap();
    pool.add_transaction(&tx2).unwrap();

    let listed = pool.pending(1000);
    assert_eq!(
        listed.iter().map(|tx| tx.id).collect::<Vec<_>>(),
        vec![tx2.id, tx1.id, tx0.id]
    );

    assert_eq!(pool.pending(2).len(), 2);
}

#[test]
fn eviction_ignores_absent_entries() {
    let key = test_key();
    let (chain, g_ts) = funded_chain(key_address(&key), 0);
    let pool = Mempool::new(chain);

    let tx = signed_transfer(&key, addr(0x02), 100, 0, 0, g_ts + 1);
    pool.add_transaction(&tx).unwrap();

    let stranger = signed_transfer(&key, addr(0x03), 100, 0, 5, g_ts + 2);
    pool.remove_transactions(&[tx.clone(), stranger]);
    assert_eq!(pool.size(), 0);
}

#[test]
fn reorg_returns_stranded_transactions_to_pool() {
    let key = test_key();
    let key_addr = key_address(&key);

    // Difficulty 1 so the fork comparison is by real weight.
    let (chain, g_ts) = funded_chain(key_addr, 1);
    let pool = Arc::new(Mempool::new(chain.clone()));
    chain.set_mempool(pool.clone());

    let a24 = chain.tip().unwrap();

    // The funded key spends on chain A.
    let tx = signed_transfer(&key, addr(0x02), GRAINS_PER_AUR / 2, 0, 0, g_ts + 10);
    pool.add_transaction(&tx).unwrap();

    let a25 = build_child(&chain, &a24, addr(0xaa), pool.pending(1000), g_ts + 25 * 3600);
    chain.add_block(a25.clone()).unwrap();

    // Confirming the block evicted the transfer.
    assert_eq!(pool.size(), 0);

    // A competing branch without the transfer overtakes chain A.
    let b25 = build_child(&chain, &a24, addr(0xbb), vec![], g_ts + 25 * 3600 + 1);
    chain.add_block(b25.clone()).unwrap();
    assert_eq!(chain.tip().unwrap().hash, a25.hash);

    let b26 = build_child(&chain, &b25, addr(0xbb), vec![], g_ts + 26 * 3600);
    chain.add_block(b26.clone()).unwrap();

    assert_eq!(chain.tip().unwrap().hash, b26.hash);
    // The stranded transfer was re-admitted: still valid on the new chain.
    assert_eq!(pool.size(), 1);
    assert_eq!(pool.pending(10)[0].id, tx.id);
}
