//! Chain and block validity rules.
//!
//! A whole chain is valid when it starts with the canonical genesis block and
//! every later block links to its predecessor (hash, index, timestamp), hashes
//! to its stored hash and meets the proof-of-work target. A single new block
//! must additionally arrive inside the mining time window and carry only
//! well-formed transactions.

use crate::{
    chain::is_genesis,
    compute_hash,
    error::ValidationError,
    pow::meets_difficulty,
    Block, ConsensusParams,
};
use tracing::{debug, warn};

pub fn validate_chain(chain: &[Block], difficulty: usize) -> Result<(), ValidationError> {
    let first = chain.first().ok_or(ValidationError::EmptyChain)?;
    if !is_genesis(first) {
        return Err(ValidationError::GenesisMismatch);
    }

    // Tail first: a forged extension usually breaks near the tip.
    for position in (1..chain.len()).rev() {
        let current = &chain[position];
        let previous = &chain[position - 1];
        validate_link(current, previous, position as u64)?;
        validate_seal(current, difficulty)?;
    }
    Ok(())
}

/// Like [`validate_chain`], but logs the failing rule instead of returning it.
pub fn is_valid_chain(chain: &[Block], difficulty: usize) -> bool {
    match validate_chain(chain, difficulty) {
        Ok(()) => true,
        Err(err) => {
            warn!(
                reason = err.rule(),
                block_index = ?err.block_index(),
                length = chain.len(),
                "chain validation failed: {err}"
            );
            false
        }
    }
}

/// Checks `candidate` as the direct successor of `tip` at wall-clock `now`.
pub fn validate_new_block(
    candidate: &Block,
    tip: &Block,
    now: u64,
    params: &ConsensusParams,
) -> Result<(), ValidationError> {
    validate_link(candidate, tip, tip.index.saturating_add(1))?;
    validate_seal(candidate, params.difficulty)?;

    let earliest = tip.timestamp.saturating_add(params.min_mining_interval_ms);
    let latest = now.saturating_add(params.max_clock_skew_ms);
    if candidate.timestamp <= earliest || candidate.timestamp > latest {
        return Err(ValidationError::TimestampWindow {
            index: candidate.index,
            timestamp: candidate.timestamp,
            earliest,
            latest,
        });
    }

    if let Some(position) = candidate
        .transactions
        .iter()
        .position(|tx| !tx.is_well_formed())
    {
        return Err(ValidationError::Transaction {
            index: candidate.index,
            position,
        });
    }
    Ok(())
}

/// Like [`validate_new_block`]; a failure is logged at `debug`, since losing
/// a mining race is routine.
pub fn is_valid_new_block(candidate: &Block, tip: &Block, now: u64, params: &ConsensusParams) -> bool {
    match validate_new_block(candidate, tip, now, params) {
        Ok(()) => true,
        Err(err) => {
            debug!(
                reason = err.rule(),
                index = candidate.index,
                "block rejected: {err}"
            );
            false
        }
    }
}

fn validate_link(current: &Block, previous: &Block, position: u64) -> Result<(), ValidationError> {
    if current.previous_hash != previous.hash {
        return Err(ValidationError::PreviousHash {
            index: current.index,
            expected: previous.hash.clone(),
            actual: current.previous_hash.clone(),
        });
    }
    match previous.index.checked_add(1) {
        Some(expected) if expected == current.index => {}
        expected => {
            return Err(ValidationError::Index {
                position,
                expected: expected.unwrap_or(u64::MAX),
                actual: current.index,
            })
        }
    }
    if current.timestamp <= previous.timestamp {
        return Err(ValidationError::Timestamp {
            index: current.index,
            previous: previous.timestamp,
            timestamp: current.timestamp,
        });
    }
    Ok(())
}

fn validate_seal(block: &Block, difficulty: usize) -> Result<(), ValidationError> {
    let calculated = compute_hash(block);
    if calculated != block.hash {
        return Err(ValidationError::Hash {
            index: block.index,
            stored: block.hash.clone(),
            calculated,
        });
    }
    if !meets_difficulty(&block.hash, difficulty) {
        return Err(ValidationError::ProofOfWork {
            index: block.index,
            hash: block.hash.clone(),
            difficulty,
        });
    }
    Ok(())
}
