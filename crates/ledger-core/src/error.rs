use thiserror::Error;

/// The rule a block or chain broke, with the block it broke it at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("chain is empty")]
    EmptyChain,
    #[error("first block is not the canonical genesis block")]
    GenesisMismatch,
    #[error("block {index}: previous hash {actual} does not match {expected}")]
    PreviousHash {
        index: u64,
        expected: String,
        actual: String,
    },
    #[error("block at position {position}: index {actual}, expected {expected}")]
    Index {
        position: u64,
        expected: u64,
        actual: u64,
    },
    #[error("block {index}: timestamp {timestamp} is not after previous timestamp {previous}")]
    Timestamp {
        index: u64,
        previous: u64,
        timestamp: u64,
    },
    #[error("block {index}: stored hash {stored} does not match calculated {calculated}")]
    Hash {
        index: u64,
        stored: String,
        calculated: String,
    },
    #[error("block {index}: hash {hash} does not meet difficulty {difficulty}")]
    ProofOfWork {
        index: u64,
        hash: String,
        difficulty: usize,
    },
    #[error("block {index}: timestamp {timestamp} outside the window ({earliest}, {latest}]")]
    TimestampWindow {
        index: u64,
        timestamp: u64,
        earliest: u64,
        latest: u64,
    },
    #[error("block {index}: transaction {position} is malformed")]
    Transaction { index: u64, position: usize },
}

impl ValidationError {
    /// Short rule name used as a structured log field.
    pub fn rule(&self) -> &'static str {
        match self {
            ValidationError::EmptyChain => "empty chain",
            ValidationError::GenesisMismatch => "invalid genesis block",
            ValidationError::PreviousHash { .. } => "invalid previous hash",
            ValidationError::Index { .. } => "invalid index",
            ValidationError::Timestamp { .. } => "invalid timestamp",
            ValidationError::Hash { .. } => "invalid hash",
            ValidationError::ProofOfWork { .. } => "invalid proof of work",
            ValidationError::TimestampWindow { .. } => "timestamp outside window",
            ValidationError::Transaction { .. } => "invalid transaction",
        }
    }

    pub fn block_index(&self) -> Option<u64> {
        match self {
            ValidationError::EmptyChain => None,
            ValidationError::GenesisMismatch => Some(0),
            ValidationError::Index { position, .. } => Some(*position),
            ValidationError::PreviousHash { index, .. }
            | ValidationError::Timestamp { index, .. }
            | ValidationError::Hash { index, .. }
            | ValidationError::ProofOfWork { index, .. }
            | ValidationError::TimestampWindow { index, .. }
            | ValidationError::Transaction { index, .. } => Some(*index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("invalid chain: {0}")]
    ChainInvalid(ValidationError),
    #[error("block rejected: {0}")]
    BlockRejected(ValidationError),
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("not enough balance for {address}: required {required}, available {available}")]
    InsufficientBalance {
        address: String,
        required: u64,
        available: i128,
    },
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::MalformedInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
