use ledger_core::{mining::MiningState, LedgerError, Message, SharedBlockchain, Transaction};

/// What distinguishes a coordinator from a miner: how peer messages and
/// submitted transactions are handled. Transport and HTTP are shared.
pub(crate) trait NodeRole: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn chain(&self) -> &SharedBlockchain;

    /// Sent to every client right after it connects.
    fn greeting(&self) -> Vec<Message> {
        vec![Message::Blockchain {
            chain: self.chain().chain(),
        }]
    }

    /// Handles one decoded peer message; the returned messages go back to
    /// the sender only.
    fn on_peer_message(&self, message: Message) -> Vec<Message>;

    /// Accepts a transaction submitted over HTTP and returns a confirmation
    /// for the caller.
    fn submit_transaction(&self, tx: Transaction) -> Result<String, LedgerError>;

    /// `None` when this role does not run a faucet.
    fn faucet(&self, _address: &str) -> Option<Result<Transaction, LedgerError>> {
        None
    }

    /// `None` when this role does not mine.
    fn mining_state(&self) -> Option<MiningState> {
        None
    }
}
