#![allow(dead_code)]

use std::fs;

use ledger_core::{
    chain::genesis_block,
    pow::{mine_block, CancelToken},
    Block, ConsensusParams, SharedBlockchain, Transaction,
};
use ledger_storage::sled_store::SledStore;
use tempfile::{tempdir, TempDir};

pub const DIFFICULTY: usize = 1;

pub fn create_temp_store() -> (TempDir, SledStore) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(db_path).expect("Failed to open SledStore"),
    )
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    assert!(!db_path.exists(), "Database directory should be removed");
}

pub fn shared() -> SharedBlockchain {
    SharedBlockchain::new(ConsensusParams::default().with_difficulty(DIFFICULTY))
}

/// Genesis plus `extra` mined blocks, ten seconds apart, each minting to
/// `miner`.
pub fn mined_chain(extra: usize, miner: &str) -> Vec<Block> {
    let mut chain = vec![genesis_block()];
    for _ in 0..extra {
        let prev = chain.last().unwrap();
        let candidate = Block::new(
            prev.index + 1,
            prev.timestamp + 10_000,
            vec![Transaction::mint(miner, 10)],
            prev.hash.clone(),
        );
        chain.push(mine_block(candidate, DIFFICULTY, &CancelToken::new()).expect("uncancelled"));
    }
    chain
}
