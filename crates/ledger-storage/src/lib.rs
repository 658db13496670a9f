pub mod sled_store;

use anyhow::Result;
use ledger_core::{chain::ChainStore, Block, LedgerEvent, SharedBlockchain};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Loads the stored chain and offers it to `shared`. Returns whether it was
/// adopted; a stored chain that no longer validates is ignored.
pub fn restore_chain<S: ChainStore + ?Sized>(store: &S, shared: &SharedBlockchain) -> Result<bool> {
    let Some(chain) = store.load_chain()? else {
        debug!("no stored chain, starting from genesis");
        return Ok(false);
    };
    let length = chain.len();
    match shared.replace_chain(chain) {
        Ok(adopted) => {
            info!(length, adopted, "restored chain from store");
            Ok(adopted)
        }
        Err(err) => {
            warn!(length, "stored chain rejected: {err}");
            Ok(false)
        }
    }
}

/// Mirrors every accepted chain mutation into `store` until `shutdown`.
pub async fn persist_events<S: ChainStore + ?Sized>(
    store: Arc<S>,
    shared: SharedBlockchain,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut events = shared.subscribe();
    // Catch up with anything accepted before we subscribed.
    if let Err(err) = store.put_chain(&shared.chain()) {
        warn!("failed to persist chain: {err:#}");
    }

    loop {
        let event = tokio::select! {
            _ = shutdown.recv() => break,
            event = events.recv() => event,
        };
        let result = match event {
            Ok(LedgerEvent::BlockAppended(block)) => append_or_rewrite(store.as_ref(), &shared, &block),
            Ok(LedgerEvent::ChainReplaced { .. }) => store.put_chain(&shared.chain()),
            Ok(LedgerEvent::TransactionQueued(_)) => Ok(()),
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "persistence lagged, rewriting full chain");
                store.put_chain(&shared.chain())
            }
            Err(RecvError::Closed) => break,
        };
        if let Err(err) = result {
            warn!("failed to persist chain: {err:#}");
        }
    }

    if let Err(err) = store.close() {
        warn!("failed to close store: {err:#}");
    }
}

/// Appends `block` when it extends the stored tip, otherwise rewrites the
/// whole chain from `shared` so a stale append cannot fork the store.
fn append_or_rewrite<S: ChainStore + ?Sized>(
    store: &S,
    shared: &SharedBlockchain,
    block: &Block,
) -> Result<()> {
    if store.tip_hash()?.as_deref() == Some(block.previous_hash.as_str()) {
        store.put_block(block)
    } else {
        debug!(index = block.index, "appended block does not extend stored tip, rewriting");
        store.put_chain(&shared.chain())
    }
}
