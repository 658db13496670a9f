//! The coordinator keeps the longest chain it has seen and relays it,
//! together with transactions and faucet grants, to every connected miner.
//! It never mines and keeps no pending pool of its own.

use crate::{hub::ClientHub, role::NodeRole};
use ledger_core::{
    consensus::ConsensusSync, constants::FAUCET_AMOUNT, error::Result, now_millis, Broadcaster,
    LedgerError, Message, SharedBlockchain, Transaction,
};
use tracing::{debug, info, warn};

pub(crate) struct Coordinator {
    sync: ConsensusSync,
    hub: ClientHub,
}

impl Coordinator {
    pub fn new(chain: SharedBlockchain, hub: ClientHub) -> Self {
        Self {
            sync: ConsensusSync::new(chain),
            hub,
        }
    }

    fn after_sync(&self, source: &'static str, result: Result<bool>) {
        match result {
            Ok(true) => {
                let chain = self.sync.chain().chain();
                info!(source, length = chain.len(), "longest chain updated, relaying");
                self.hub.broadcast(Message::Blockchain { chain });
            }
            Ok(false) => debug!(source, "received chain kept out by fork choice"),
            Err(err) => warn!(source, "peer chain rejected: {err}"),
        }
    }

    fn relay(&self, transaction: Transaction) -> Result<()> {
        self.sync.chain().check_transaction(&transaction)?;
        debug!(to = %transaction.to, amount = transaction.amount, "relaying transaction");
        self.hub.broadcast(Message::Transaction { transaction });
        Ok(())
    }
}

impl NodeRole for Coordinator {
    fn name(&self) -> &'static str {
        "coordinator"
    }

    fn chain(&self) -> &SharedBlockchain {
        self.sync.chain()
    }

    fn on_peer_message(&self, message: Message) -> Vec<Message> {
        match message {
            Message::Blockchain { chain } => {
                self.after_sync("BLOCKCHAIN", self.sync.on_chain_payload(chain));
                vec![]
            }
            Message::Block { block } => {
                self.after_sync("BLOCK", self.sync.on_block_announce(block));
                vec![]
            }
            Message::GetBlockchain => vec![Message::Blockchain {
                chain: self.chain().chain(),
            }],
            Message::Transaction { transaction } => {
                if let Err(err) = self.relay(transaction) {
                    warn!("peer transaction not relayed: {err}");
                }
                vec![]
            }
            Message::NewTransaction { .. } => vec![],
        }
    }

    fn submit_transaction(&self, tx: Transaction) -> Result<String> {
        self.relay(tx)?;
        Ok("Transaction relayed to miners".into())
    }

    fn faucet(&self, address: &str) -> Option<Result<Transaction>> {
        if address.is_empty() {
            return Some(Err(LedgerError::InvalidTransaction(
                "faucet request must include an address".into(),
            )));
        }
        let grant = Transaction {
            timestamp: Some(now_millis()),
            ..Transaction::mint(address, FAUCET_AMOUNT)
        };
        info!(address, amount = FAUCET_AMOUNT, "faucet grant relayed");
        self.hub.broadcast(Message::Transaction {
            transaction: grant.clone(),
        });
        Some(Ok(grant))
    }
}
