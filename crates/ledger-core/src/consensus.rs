use crate::{
    chain::is_genesis,
    error::{LedgerError, Result, ValidationError},
    mining::MiningHandle,
    Block, SharedBlockchain,
};
use tracing::{info, warn};

/// Reconciles chains and blocks received from peers with the local chain.
#[derive(Clone)]
pub struct ConsensusSync {
    chain: SharedBlockchain,
    mining: Option<MiningHandle>,
}

impl ConsensusSync {
    /// For nodes that do not mine.
    pub fn new(chain: SharedBlockchain) -> Self {
        Self {
            chain,
            mining: None,
        }
    }

    /// For mining nodes: replacements cancel the in-flight search, and the
    /// first chain from the right network releases the sync gate.
    pub fn with_mining(chain: SharedBlockchain, mining: MiningHandle) -> Self {
        Self {
            chain,
            mining: Some(mining),
        }
    }

    pub fn chain(&self) -> &SharedBlockchain {
        &self.chain
    }

    /// Handles a full chain snapshot. `Ok(true)` when it became authoritative.
    pub fn on_chain_payload(&self, chain: Vec<Block>) -> Result<bool> {
        match chain.first() {
            Some(first) if is_genesis(first) => {}
            Some(_) => {
                warn!(length = chain.len(), "received chain with invalid genesis block");
                return Err(LedgerError::ChainInvalid(ValidationError::GenesisMismatch));
            }
            None => return Err(LedgerError::ChainInvalid(ValidationError::EmptyChain)),
        }

        let result = self.chain.replace_chain(chain);

        if let Some(mining) = &self.mining {
            if matches!(result, Ok(true)) && mining.supersede() {
                info!("chain replaced while mining, in-flight block discarded");
            }
            mining.mark_synced();
        }
        result
    }

    /// Handles a single announced block by offering the local chain extended
    /// with it to the fork choice.
    pub fn on_block_announce(&self, block: Block) -> Result<bool> {
        let mut candidate = self.chain.chain();
        candidate.push(block);
        self.on_chain_payload(candidate)
    }
}
