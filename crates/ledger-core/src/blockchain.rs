//! Authoritative chain plus pending pool, and the shared handle that
//! serializes every mutation of them.

use crate::{
    chain::genesis_block,
    constants::EVENT_CHANNEL_CAPACITY,
    error::{LedgerError, Result, ValidationError},
    ledger::{self, Balance, Issuance},
    now_millis,
    validation::{is_valid_new_block, validate_chain, validate_new_block},
    Block, ConsensusParams, Transaction,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEvent {
    TransactionQueued(Transaction),
    BlockAppended(Block),
    ChainReplaced { length: usize, tip_hash: String },
}

/// Single-threaded state. Only reachable from other tasks through
/// [`SharedBlockchain`].
#[derive(Debug, Clone)]
pub struct Blockchain {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    params: ConsensusParams,
}

impl Blockchain {
    pub fn new(params: ConsensusParams) -> Self {
        Self {
            chain: vec![genesis_block()],
            pending: Vec::new(),
            params,
        }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// The chain always holds at least the genesis block.
    pub fn tip(&self) -> &Block {
        &self.chain[self.chain.len() - 1]
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn balance_of(&self, address: &str) -> Balance {
        ledger::balance_of(&self.chain, address)
    }

    pub fn issuance(&self) -> Issuance {
        ledger::issuance(&self.chain, self.params.mining_reward)
    }

    /// Admission checks without touching the pool.
    pub fn check_transaction(&self, tx: &Transaction) -> Result<()> {
        if tx.to.is_empty() {
            return Err(LedgerError::InvalidTransaction(
                "transaction must include a to address".into(),
            ));
        }
        if tx.amount == 0 {
            return Err(LedgerError::InvalidTransaction(
                "transaction must include a positive amount".into(),
            ));
        }
        let Some(from) = tx.from.as_deref() else {
            return Ok(());
        };
        let available = self.balance_of(from);
        if available < tx.amount as Balance {
            return Err(LedgerError::InsufficientBalance {
                address: from.to_string(),
                required: tx.amount,
                available,
            });
        }
        Ok(())
    }

    pub fn add_transaction(&mut self, tx: Transaction) -> Result<()> {
        self.check_transaction(&tx)?;
        debug!(from = ?tx.from, to = %tx.to, amount = tx.amount, "transaction queued");
        self.pending.push(tx);
        Ok(())
    }

    pub fn try_add_block(&mut self, candidate: Block, now: u64) -> std::result::Result<(), ValidationError> {
        validate_new_block(&candidate, self.tip(), now, &self.params)?;
        self.chain.push(candidate);
        Ok(())
    }

    /// Appends `candidate` if it extends the current tip. A `false` here is
    /// the normal outcome of losing a mining race.
    pub fn add_block(&mut self, candidate: Block) -> bool {
        if !is_valid_new_block(&candidate, self.tip(), now_millis(), &self.params) {
            return false;
        }
        debug!(index = candidate.index, "block added to chain");
        self.chain.push(candidate);
        true
    }

    /// Validates `candidate` and adopts it if it wins the fork choice.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<bool> {
        check_candidate(&candidate, self.params.difficulty)?;
        Ok(self.apply_fork_choice(candidate))
    }

    /// Longer wins; on equal length the earlier tip wins. `candidate` must
    /// already be valid.
    pub(crate) fn apply_fork_choice(&mut self, candidate: Vec<Block>) -> bool {
        let (new_len, old_len) = (candidate.len(), self.chain.len());
        let new_tip_ts = candidate.last().map(|b| b.timestamp).unwrap_or(u64::MAX);
        let old_tip_ts = self.tip().timestamp;

        let reason = if new_len > old_len {
            "longer chain received"
        } else if new_len == old_len && new_tip_ts < old_tip_ts {
            "equal length, earlier timestamp received"
        } else {
            debug!(
                new_length = new_len,
                current_length = old_len,
                "blockchain kept: candidate is not longer or not earlier"
            );
            return false;
        };

        info!(new_length = new_len, old_length = old_len, "blockchain updated: {reason}");
        self.chain = candidate;
        true
    }

    pub fn reset_pending(&mut self, txs: Vec<Transaction>) {
        self.pending = txs;
    }
}

fn check_candidate(candidate: &[Block], difficulty: usize) -> Result<()> {
    validate_chain(candidate, difficulty).map_err(|err| {
        warn!(
            reason = err.rule(),
            block_index = ?err.block_index(),
            "blockchain rejected: {err}"
        );
        LedgerError::ChainInvalid(err)
    })
}

/// Cloneable handle to one [`Blockchain`]. Mutations take the write lock;
/// reads share the read lock and never see a chain mid-replacement.
#[derive(Clone)]
pub struct SharedBlockchain {
    inner: Arc<RwLock<Blockchain>>,
    events: broadcast::Sender<LedgerEvent>,
}

impl SharedBlockchain {
    pub fn new(params: ConsensusParams) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(Blockchain::new(params))),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Run `f` against a consistent view of the state.
    pub fn read<R>(&self, f: impl FnOnce(&Blockchain) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn params(&self) -> ConsensusParams {
        *self.inner.read().params()
    }

    pub fn chain(&self) -> Vec<Block> {
        self.inner.read().chain().to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn tip(&self) -> Block {
        self.inner.read().tip().clone()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.inner.read().pending().to_vec()
    }

    pub fn balance_of(&self, address: &str) -> Balance {
        self.inner.read().balance_of(address)
    }

    pub fn issuance(&self) -> Issuance {
        self.inner.read().issuance()
    }

    pub fn check_transaction(&self, tx: &Transaction) -> Result<()> {
        self.inner.read().check_transaction(tx)
    }

    pub fn add_transaction(&self, tx: Transaction) -> Result<()> {
        let mut state = self.inner.write();
        state.add_transaction(tx.clone())?;
        self.emit(LedgerEvent::TransactionQueued(tx));
        Ok(())
    }

    pub fn add_block(&self, candidate: Block) -> bool {
        let mut state = self.inner.write();
        let added = state.add_block(candidate.clone());
        if added {
            self.emit(LedgerEvent::BlockAppended(candidate));
        }
        added
    }

    /// Appends a locally mined block and, only if it was accepted, resets the
    /// pending pool to the miner's reward in the same critical section.
    pub fn commit_mined_block(&self, block: Block, reward: Transaction) -> bool {
        let mut state = self.inner.write();
        let index = block.index;
        match state.try_add_block(block.clone(), now_millis()) {
            Ok(()) => {
                state.reset_pending(vec![reward]);
                self.emit(LedgerEvent::BlockAppended(block));
                true
            }
            Err(err) => {
                debug!(index, reason = err.rule(), "mined block rejected: {err}");
                false
            }
        }
    }

    pub fn replace_chain(&self, candidate: Vec<Block>) -> Result<bool> {
        // Validation reads only the candidate, so it runs outside the lock.
        check_candidate(&candidate, self.params().difficulty)?;

        let mut state = self.inner.write();
        if !state.apply_fork_choice(candidate) {
            return Ok(false);
        }
        self.emit(LedgerEvent::ChainReplaced {
            length: state.len(),
            tip_hash: state.tip().hash.clone(),
        });
        Ok(true)
    }

    /// Called with the write guard held, so subscribers see events in the
    /// order the mutations happened.
    fn emit(&self, event: LedgerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
