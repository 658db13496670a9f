//! Background mining: drain the pending pool into a candidate block, search
//! for a nonce off the async runtime, and hand the result back to the
//! shared chain, which re-validates it against whatever the tip is by then.

use crate::{
    message::{Broadcaster, Message},
    mine::mine_block_parallel,
    now_millis,
    pow::{self, CancelToken},
    Block, SharedBlockchain, Transaction,
};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningState {
    Idle,
    Mining,
    /// Paused while syncing, or the last search was superseded.
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct MinerConfig {
    /// Receives the mining reward.
    pub address: String,
    /// Spread the nonce search over the rayon pool.
    pub parallel: bool,
}

/// What one mining cycle ended with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Accepted(Block),
    /// Another block reached the tip first.
    Rejected,
    Superseded,
    /// The tip is younger than the minimum mining interval.
    TooSoon(Duration),
}

struct HandleShared {
    state: watch::Sender<MiningState>,
    synced: watch::Sender<bool>,
    current: Mutex<Option<CancelToken>>,
}

/// Control surface of a [`MiningLoop`] used by the sync path and the
/// service layer.
#[derive(Clone)]
pub struct MiningHandle {
    shared: Arc<HandleShared>,
}

impl MiningHandle {
    fn new(synced: bool) -> Self {
        let initial = if synced {
            MiningState::Idle
        } else {
            MiningState::Cancelled
        };
        Self {
            shared: Arc::new(HandleShared {
                state: watch::channel(initial).0,
                synced: watch::channel(synced).0,
                current: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> MiningState {
        *self.shared.state.borrow()
    }

    pub fn is_synced(&self) -> bool {
        *self.shared.synced.borrow()
    }

    /// Lets the loop start mining once the first chain sync is done.
    pub fn mark_synced(&self) {
        if !self.shared.synced.send_replace(true) {
            info!("initial chain sync complete, mining enabled");
        }
    }

    /// Cancels the in-flight nonce search, if any. Returns whether one was
    /// running.
    pub fn supersede(&self) -> bool {
        match self.shared.current.lock().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn set_state(&self, state: MiningState) {
        self.shared.state.send_replace(state);
    }

    pub(crate) fn begin_search(&self, token: CancelToken) {
        *self.shared.current.lock() = Some(token);
        self.set_state(MiningState::Mining);
    }

    fn end_search(&self) {
        self.shared.current.lock().take();
    }
}

pub struct MiningLoop<B: ?Sized> {
    chain: SharedBlockchain,
    broadcaster: Arc<B>,
    config: MinerConfig,
    handle: MiningHandle,
}

impl<B> MiningLoop<B>
where
    B: Broadcaster + ?Sized + 'static,
{
    /// `synced == false` keeps the loop paused until
    /// [`MiningHandle::mark_synced`] is called.
    pub fn new(chain: SharedBlockchain, broadcaster: Arc<B>, config: MinerConfig, synced: bool) -> Self {
        Self {
            chain,
            broadcaster,
            config,
            handle: MiningHandle::new(synced),
        }
    }

    pub fn handle(&self) -> MiningHandle {
        self.handle.clone()
    }

    /// Runs mining cycles until `shutdown` fires (or its sender is dropped).
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut synced = self.handle.shared.synced.subscribe();
        info!(address = %self.config.address, parallel = self.config.parallel, "mining loop started");

        loop {
            if !*synced.borrow_and_update() {
                self.handle.set_state(MiningState::Cancelled);
                tokio::select! {
                    _ = shutdown.recv() => break,
                    res = synced.changed() => if res.is_err() { break },
                }
                continue;
            }

            let outcome = tokio::select! {
                _ = shutdown.recv() => {
                    self.handle.supersede();
                    break;
                }
                outcome = self.mine_once() => outcome,
            };

            let delay = match outcome {
                CycleOutcome::Accepted(_) => {
                    self.handle.set_state(MiningState::Idle);
                    self.next_cycle_delay()
                }
                CycleOutcome::Rejected => {
                    self.handle.set_state(MiningState::Idle);
                    Duration::ZERO
                }
                CycleOutcome::Superseded => Duration::ZERO,
                CycleOutcome::TooSoon(wait) => wait,
            };

            if delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.handle.set_state(MiningState::Cancelled);
        info!("mining loop stopped");
    }

    /// One cycle: build on the current tip, search, submit.
    pub async fn mine_once(&self) -> CycleOutcome {
        let params = self.chain.params();
        let now = now_millis();

        let candidate = self.chain.read(|bc| {
            let tip = bc.tip();
            let earliest = tip.timestamp.saturating_add(params.min_mining_interval_ms);
            if now <= earliest {
                return Err(Duration::from_millis(earliest - now + 1));
            }
            Ok(Block::new(
                tip.index + 1,
                now,
                bc.pending().to_vec(),
                tip.hash.clone(),
            ))
        });
        let candidate = match candidate {
            Ok(block) => block,
            Err(wait) => return CycleOutcome::TooSoon(wait),
        };

        let index = candidate.index;
        debug!(index, txs = candidate.transactions.len(), "mining block");

        let token = CancelToken::new();
        self.handle.begin_search(token.clone());
        let difficulty = params.difficulty;
        let parallel = self.config.parallel;
        let search = tokio::task::spawn_blocking(move || {
            if parallel {
                mine_block_parallel(candidate, difficulty, &token)
            } else {
                pow::mine_block(candidate, difficulty, &token)
            }
        });
        let mined = search.await;
        self.handle.end_search();

        let block = match mined {
            Ok(Some(block)) => block,
            Ok(None) => {
                info!(index, "mining superseded by a newer chain");
                self.handle.set_state(MiningState::Cancelled);
                return CycleOutcome::Superseded;
            }
            Err(err) => {
                warn!(index, "mining worker failed: {err}");
                self.handle.set_state(MiningState::Cancelled);
                return CycleOutcome::Superseded;
            }
        };

        let reward = Transaction::mint(self.config.address.clone(), params.mining_reward);
        if !self.chain.commit_mined_block(block.clone(), reward) {
            info!(index, "block rejected after mining");
            return CycleOutcome::Rejected;
        }

        info!(index, hash = %block.hash, nonce = block.nonce, "block mined and added");
        self.broadcaster.broadcast(Message::Blockchain {
            chain: self.chain.chain(),
        });
        self.broadcaster.broadcast(Message::Block {
            block: block.clone(),
        });
        CycleOutcome::Accepted(block)
    }

    fn next_cycle_delay(&self) -> Duration {
        let params = self.chain.params();
        let jitter = rand::thread_rng().gen_range(0..=params.mining_jitter_ms);
        Duration::from_millis(params.min_mining_interval_ms + jitter)
    }
}
