use ledger_core::{
    chain::genesis_block,
    pow::{mine_block, CancelToken},
    Block, ConsensusParams, Transaction,
};

pub const DIFFICULTY: usize = 2;

pub fn params() -> ConsensusParams {
    ConsensusParams::default().with_difficulty(DIFFICULTY)
}

pub fn mine_on(prev: &Block, txs: Vec<Transaction>, timestamp: u64) -> Block {
    let candidate = Block::new(prev.index + 1, timestamp, txs, prev.hash.clone());
    mine_block(candidate, DIFFICULTY, &CancelToken::new()).expect("uncancelled search")
}

/// Genesis plus `extra` empty blocks; block `i` is stamped
/// `genesis + i * 10s + skew_ms`.
pub fn chain_with(extra: usize, skew_ms: u64) -> Vec<Block> {
    let mut chain = vec![genesis_block()];
    for i in 1..=extra as u64 {
        let ts = chain[0].timestamp + i * 10_000 + skew_ms;
        let block = mine_on(chain.last().unwrap(), vec![], ts);
        chain.push(block);
    }
    chain
}
