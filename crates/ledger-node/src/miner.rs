//! Miner role: a mining loop fed by the pending pool, an upstream WebSocket
//! link to the coordinator, and its own clients served through the hub.

use crate::{constants::RECONNECT_DELAY, hub::ClientHub, role::NodeRole};
use futures_util::{Sink, SinkExt, StreamExt};
use ledger_core::{
    consensus::ConsensusSync,
    error::Result,
    mining::{MiningHandle, MiningState},
    Broadcaster, LedgerEvent, Message, SharedBlockchain, Transaction,
};
use std::sync::Arc;
use tokio::{
    net::TcpStream,
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
};
use tokio_tungstenite::{
    connect_async, tungstenite, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

pub(crate) struct MinerNode {
    sync: ConsensusSync,
    mining: MiningHandle,
}

impl MinerNode {
    pub fn new(chain: SharedBlockchain, mining: MiningHandle) -> Self {
        Self {
            sync: ConsensusSync::with_mining(chain, mining.clone()),
            mining,
        }
    }
}

impl NodeRole for MinerNode {
    fn name(&self) -> &'static str {
        "miner"
    }

    fn chain(&self) -> &SharedBlockchain {
        self.sync.chain()
    }

    fn on_peer_message(&self, message: Message) -> Vec<Message> {
        match message {
            Message::Blockchain { chain } => {
                match self.sync.on_chain_payload(chain) {
                    Ok(replaced) => debug!(replaced, "chain payload handled"),
                    Err(err) => warn!("chain payload rejected: {err}"),
                }
                vec![]
            }
            Message::Block { block } => {
                if let Err(err) = self.sync.on_block_announce(block) {
                    debug!("announced block not adopted: {err}");
                }
                vec![]
            }
            Message::Transaction { transaction } => {
                match self.chain().add_transaction(transaction) {
                    Ok(()) => info!("network transaction added to pending pool"),
                    Err(err) => warn!("network transaction rejected: {err}"),
                }
                vec![]
            }
            Message::GetBlockchain => vec![Message::Blockchain {
                chain: self.chain().chain(),
            }],
            Message::NewTransaction { .. } => vec![],
        }
    }

    fn submit_transaction(&self, tx: Transaction) -> Result<String> {
        self.chain().add_transaction(tx)?;
        Ok("Transaction added successfully".into())
    }

    fn mining_state(&self) -> Option<MiningState> {
        Some(self.mining.state())
    }
}

/// Routes what the mining loop announces: the full chain goes upstream to
/// the coordinator, everything else to this miner's own clients.
pub(crate) struct MinerBroadcaster {
    upstream: mpsc::Sender<Message>,
    hub: ClientHub,
}

impl MinerBroadcaster {
    pub fn new(upstream: mpsc::Sender<Message>, hub: ClientHub) -> Self {
        Self { upstream, hub }
    }
}

impl Broadcaster for MinerBroadcaster {
    fn broadcast(&self, message: Message) {
        match message {
            Message::Blockchain { .. } => {
                if let Err(err) = self.upstream.try_send(message) {
                    warn!("chain not sent upstream: {err}");
                }
            }
            other => self.hub.broadcast(other),
        }
    }
}

/// Tells local clients about queued transfers and replaced chains.
pub(crate) async fn forward_events(
    chain: SharedBlockchain,
    hub: ClientHub,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut events = chain.subscribe();
    loop {
        let event = tokio::select! {
            _ = shutdown.recv() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(LedgerEvent::TransactionQueued(transaction)) if !transaction.is_mint() => {
                hub.broadcast(Message::NewTransaction { transaction })
            }
            Ok(LedgerEvent::ChainReplaced { .. }) => hub.broadcast(Message::Blockchain {
                chain: chain.chain(),
            }),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "event forwarder lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

enum LinkEnd {
    Disconnected,
    Shutdown,
}

/// Keeps a link to the coordinator open, reconnecting after
/// [`RECONNECT_DELAY`]. Queued upstream messages survive reconnects.
pub(crate) async fn run_upstream(
    url: String,
    node: Arc<MinerNode>,
    mut outbound: mpsc::Receiver<Message>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let connected = tokio::select! {
            _ = shutdown.recv() => return,
            connected = connect_async(url.as_str()) => connected,
        };
        match connected {
            Ok((socket, _)) => {
                info!(%url, "connected to coordinator");
                if let LinkEnd::Shutdown =
                    serve_upstream(socket, node.as_ref(), &mut outbound, &mut shutdown).await
                {
                    return;
                }
                warn!(%url, "coordinator link closed");
            }
            Err(err) => warn!(%url, "coordinator unreachable: {err}"),
        }

        tokio::select! {
            _ = shutdown.recv() => return,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

async fn serve_upstream(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    node: &MinerNode,
    outbound: &mut mpsc::Receiver<Message>,
    shutdown: &mut broadcast::Receiver<()>,
) -> LinkEnd {
    let (mut sink, mut stream) = socket.split();
    if let Err(err) = send_upstream(&mut sink, &Message::GetBlockchain).await {
        warn!("chain request failed: {err:#}");
        return LinkEnd::Disconnected;
    }

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                let _ = sink.close().await;
                return LinkEnd::Shutdown;
            }
            Some(message) = outbound.recv() => {
                if let Err(err) = send_upstream(&mut sink, &message).await {
                    warn!(kind = message.kind(), "upstream send failed: {err:#}");
                    return LinkEnd::Disconnected;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match Message::from_json(&text) {
                    Ok(message) => {
                        debug!(kind = message.kind(), "coordinator message received");
                        for reply in node.on_peer_message(message) {
                            if send_upstream(&mut sink, &reply).await.is_err() {
                                return LinkEnd::Disconnected;
                            }
                        }
                    }
                    Err(err) => warn!("dropping coordinator message: {err}"),
                },
                Some(Ok(WsMessage::Close(_))) | None => return LinkEnd::Disconnected,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!("coordinator link error: {err}");
                    return LinkEnd::Disconnected;
                }
            },
        }
    }
}

async fn send_upstream<S>(sink: &mut S, message: &Message) -> anyhow::Result<()>
where
    S: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    sink.send(WsMessage::Text(message.to_json()?)).await?;
    Ok(())
}
