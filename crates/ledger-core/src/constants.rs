use serde::{Deserialize, Serialize};

pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// Leading hex zeros a block hash must carry.
pub const POW_TARGET_DIFFICULTY: usize = 4;
pub const MIN_MINING_INTERVAL_MS: u64 = 6_000;
pub const MAX_CLOCK_SKEW_MS: u64 = 60_000;
pub const MINING_JITTER_MS: u64 = 20_000;
pub const MINING_REWARD: u64 = 10;
pub const FAUCET_AMOUNT: u64 = 100;

pub const GENESIS_TIMESTAMP: u64 = 1_726_975_000_000;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Rules every node of one network must agree on, plus the miner pacing knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub difficulty: usize,
    pub mining_reward: u64,
    pub min_mining_interval_ms: u64,
    pub max_clock_skew_ms: u64,
    pub mining_jitter_ms: u64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            difficulty: POW_TARGET_DIFFICULTY,
            mining_reward: MINING_REWARD,
            min_mining_interval_ms: MIN_MINING_INTERVAL_MS,
            max_clock_skew_ms: MAX_CLOCK_SKEW_MS,
            mining_jitter_ms: MINING_JITTER_MS,
        }
    }
}

impl ConsensusParams {
    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty;
        self
    }
}
