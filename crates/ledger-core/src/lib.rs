pub mod blockchain;
pub mod consensus;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod message;
pub mod mine;
pub mod mining;
pub mod validation;

pub use blockchain::{Blockchain, LedgerEvent, SharedBlockchain};
pub use constants::ConsensusParams;
pub use error::{LedgerError, ValidationError};
pub use message::{Broadcaster, Message};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A value transfer. `from == None` is a mint (mining reward or faucet).
///
/// Field order is part of the block hash preimage: `from`, `to`, `amount`,
/// then `timestamp` when present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Option<String>,
    pub to: String,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Transaction {
    pub fn transfer(from: impl Into<String>, to: impl Into<String>, amount: u64) -> Self {
        Self {
            from: Some(from.into()),
            to: to.into(),
            amount,
            timestamp: Some(now_millis()),
        }
    }

    /// Reward mint; carries no timestamp.
    pub fn mint(to: impl Into<String>, amount: u64) -> Self {
        Self {
            from: None,
            to: to.into(),
            amount,
            timestamp: None,
        }
    }

    pub fn is_mint(&self) -> bool {
        self.from.is_none()
    }

    /// A transaction needs a recipient and a non-zero amount.
    pub fn is_well_formed(&self) -> bool {
        !self.to.is_empty() && self.amount > 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
}

impl Block {
    /// Unmined candidate with nonce 0 and a consistent hash.
    pub fn new(
        index: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<String>,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            transactions,
            previous_hash: previous_hash.into(),
            hash: String::new(),
            nonce: 0,
        };
        block.hash = compute_hash(&block);
        block
    }

    /// Everything the hash covers except the nonce, so a nonce search only
    /// serializes the transactions once.
    pub fn hash_preimage_prefix(&self) -> String {
        // Plain structs of strings and integers always serialize.
        let txs = serde_json::to_string(&self.transactions).expect("transactions serialize");
        format!(
            "{}{}{}{}",
            self.index, self.previous_hash, self.timestamp, txs
        )
    }

    pub fn calculate_hash(&self) -> String {
        compute_hash(self)
    }
}

/// SHA-256 over index, previous hash, timestamp, transaction JSON and nonce.
pub fn compute_hash(block: &Block) -> String {
    hash_with_prefix(&block.hash_preimage_prefix(), block.nonce)
}

pub fn hash_with_prefix(prefix: &str, nonce: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(nonce.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

pub mod pow {
    use super::{hash_with_prefix, Block};
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    /// Shared flag that stops a nonce search.
    #[derive(Clone, Debug, Default)]
    pub struct CancelToken(Arc<AtomicBool>);

    impl CancelToken {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn cancel(&self) {
            self.0.store(true, Ordering::Relaxed);
        }

        pub fn is_cancelled(&self) -> bool {
            self.0.load(Ordering::Relaxed)
        }
    }

    /// Mine the block by incrementing the nonce until the hash starts with
    /// `difficulty` hex zeros. Returns `None` only when `cancel` fires first.
    pub fn mine_block(mut block: Block, difficulty: usize, cancel: &CancelToken) -> Option<Block> {
        let prefix = block.hash_preimage_prefix();
        loop {
            let hash = hash_with_prefix(&prefix, block.nonce);
            if meets_difficulty(&hash, difficulty) {
                block.hash = hash;
                return Some(block);
            }
            if cancel.is_cancelled() {
                return None;
            }
            block.nonce = block.nonce.wrapping_add(1);
        }
    }

    pub fn leading_zero_digits(hash: &str) -> usize {
        hash.bytes().take_while(|b| *b == b'0').count()
    }

    pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
        hash.len() >= difficulty && leading_zero_digits(hash) >= difficulty
    }
}

pub mod chain {
    use super::constants::{GENESIS_HASH, GENESIS_PREVIOUS_HASH, GENESIS_TIMESTAMP};
    use super::Block;
    use anyhow::Result;

    /// Trait the storage backends implement to snapshot the authoritative chain.
    /// This lives in `ledger-core` to avoid a circular dependency.
    pub trait ChainStore: Send + Sync {
        /// Overwrite the stored chain with `chain`.
        fn put_chain(&self, chain: &[Block]) -> Result<()>;
        fn put_block(&self, block: &Block) -> Result<()>;
        fn get_block(&self, index: u64) -> Result<Option<Block>>;
        /// `None` when nothing has been stored yet.
        fn load_chain(&self) -> Result<Option<Vec<Block>>>;
        fn tip_height(&self) -> Result<u64>;
        fn tip_hash(&self) -> Result<Option<String>>;
        fn close(&self) -> Result<()>;
    }

    /// The block every node starts from. Never mined; matched by equality.
    pub fn genesis_block() -> Block {
        Block {
            index: 0,
            timestamp: GENESIS_TIMESTAMP,
            transactions: vec![],
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            hash: GENESIS_HASH.to_string(),
            nonce: 0,
        }
    }

    pub fn is_genesis(block: &Block) -> bool {
        block.index == 0
            && block.timestamp == GENESIS_TIMESTAMP
            && block.transactions.is_empty()
            && block.previous_hash == GENESIS_PREVIOUS_HASH
            && block.hash == GENESIS_HASH
            && block.nonce == 0
    }
}


#[cfg(test)]
mod tests {
    use super::chain::{genesis_block, is_genesis};
    use super::*;

    fn sample_txs() -> Vec<Transaction> {
        vec![
            Transaction {
                from: Some("Alice".to_string()),
                to: "Bob".to_string(),
                amount: 10,
                timestamp: Some(1_600_000_000_000),
            },
            Transaction {
                from: Some("Bob".to_string()),
                to: "Charlie".to_string(),
                amount: 5,
                timestamp: Some(1_600_000_100_000),
            },
        ]
    }

    #[test]
    fn leading_zero_digits_examples() {
        assert_eq!(pow::leading_zero_digits("0000abcd"), 4);
        assert_eq!(pow::leading_zero_digits("00f0"), 2);
        assert_eq!(pow::leading_zero_digits("f000"), 0);
        assert!(pow::meets_difficulty("000a", 3));
        assert!(!pow::meets_difficulty("00a0", 3));
        assert!(!pow::meets_difficulty("00", 3));
    }

    #[test]
    fn mine_block_example() {
        let block = Block::new(1, 1_726_975_010_000, sample_txs(), constants::GENESIS_HASH);
        let mined = pow::mine_block(block, 2, &pow::CancelToken::new()).unwrap();
        assert!(mined.hash.starts_with("00"));
        assert_eq!(compute_hash(&mined), mined.hash);
    }

    #[test]
    fn cancelled_search_returns_none() {
        let block = Block::new(1, 1_726_975_010_000, vec![], constants::GENESIS_HASH);
        let cancel = pow::CancelToken::new();
        cancel.cancel();
        assert!(pow::mine_block(block, constants::HASH_HEX_SIZE, &cancel).is_none());
    }

    #[test]
    fn genesis_block_example() {
        let genesis = genesis_block();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.hash.len(), constants::HASH_HEX_SIZE);
        assert_eq!(genesis.timestamp, constants::GENESIS_TIMESTAMP);
        assert!(genesis.transactions.is_empty());
        assert!(is_genesis(&genesis));
    }

    #[test]
    fn genesis_check_compares_every_field() {
        let mut g = genesis_block();
        g.nonce = 1;
        assert!(!is_genesis(&g));
        let mut g = genesis_block();
        g.timestamp += 1;
        assert!(!is_genesis(&g));
        let mut g = genesis_block();
        g.transactions.push(Transaction::mint("x", 1));
        assert!(!is_genesis(&g));
    }

    #[test]
    fn hash_preimage_layout() {
        let block = Block {
            index: 1,
            timestamp: 1_726_975_010_000,
            transactions: vec![Transaction::mint("miner", 10)],
            previous_hash: "abc".to_string(),
            hash: String::new(),
            nonce: 7,
        };
        assert_eq!(
            block.hash_preimage_prefix(),
            r#"1abc1726975010000[{"from":null,"to":"miner","amount":10}]"#
        );
        let mut hasher = Sha256::new();
        hasher.update(br#"1abc1726975010000[{"from":null,"to":"miner","amount":10}]7"#);
        assert_eq!(compute_hash(&block), hex::encode(hasher.finalize()));
    }

    #[test]
    fn block_hash_consistency() {
        let block = Block::new(1, 1_600_000_200_000, sample_txs(), "0");
        assert_eq!(block.hash, block.calculate_hash());
        assert_eq!(compute_hash(&block), compute_hash(&block.clone()));
        assert_eq!(block.hash.len(), constants::HASH_HEX_SIZE);
    }

    #[test]
    fn block_hash_changes_with_nonce() {
        let mut block = Block::new(1, 1_600_000_200_000, sample_txs(), "0");
        let hash1 = compute_hash(&block);
        block.nonce += 1;
        assert_ne!(hash1, compute_hash(&block));
    }

    #[test]
    fn block_hash_depends_on_transaction_order() {
        let txs = sample_txs();
        let reversed: Vec<Transaction> = txs.iter().rev().cloned().collect();
        let a = Block::new(1, 1_600_000_200_000, txs, "0");
        let b = Block::new(1, 1_600_000_200_000, reversed, "0");
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn transaction_inequality_different_timestamp() {
        let mut tx2 = sample_txs()[0].clone();
        tx2.timestamp = Some(1_600_000_000_001);
        assert_ne!(sample_txs()[0], tx2);
    }

    #[test]
    fn transaction_well_formedness() {
        assert!(Transaction::mint("bob", 1).is_well_formed());
        assert!(!Transaction::mint("", 1).is_well_formed());
        assert!(!Transaction::transfer("a", "b", 0).is_well_formed());
        assert!(Transaction::mint("bob", 1).is_mint());
        assert!(!Transaction::transfer("a", "b", 1).is_mint());
    }

    #[test]
    fn transaction_serialization_example() {
        let tx = sample_txs().remove(0);
        let json = serde_json::to_string(&tx).unwrap();
        assert_eq!(
            json,
            r#"{"from":"Alice","to":"Bob","amount":10,"timestamp":1600000000000}"#
        );
        let mint: Transaction = serde_json::from_str(r#"{"from":null,"to":"Bob","amount":3}"#).unwrap();
        assert!(mint.is_mint());
        assert_eq!(mint.timestamp, None);
    }

    #[test]
    fn block_serialization_uses_wire_names() {
        let block = Block::new(1, 1_600_000_200_000, sample_txs(), "0");
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["previousHash"], "0");
        assert_eq!(value["transactions"].as_array().unwrap().len(), 2);
        let back: Block = serde_json::from_value(value).unwrap();
        assert_eq!(back, block);
    }
}
