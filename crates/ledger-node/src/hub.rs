//! Fan-out to every connected WebSocket client, and the per-connection task
//! that feeds inbound frames to the node role.

use crate::{
    api::AppState,
    constants::{CLIENT_REPLY_CAPACITY, HUB_CHANNEL_CAPACITY},
};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use ledger_core::{Broadcaster, Message};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub(crate) struct ClientHub {
    tx: broadcast::Sender<Message>,
}

impl ClientHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Broadcaster for ClientHub {
    fn broadcast(&self, message: Message) {
        let kind = message.kind();
        match self.tx.send(message) {
            Ok(clients) => debug!(kind, clients, "broadcast to clients"),
            Err(_) => debug!(kind, "no clients connected, broadcast dropped"),
        }
    }
}

pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut fanout = state.hub.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::channel::<Message>(CLIENT_REPLY_CAPACITY);

    for message in state.role.greeting() {
        let _ = reply_tx.try_send(message);
    }
    info!(clients = state.hub.client_count(), "websocket client connected");

    let writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                Some(message) = reply_rx.recv() => message,
                received = fanout.recv() => match received {
                    Ok(message) => message,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "slow websocket client, messages dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            let text = match message.to_json() {
                Ok(text) => text,
                Err(err) => {
                    warn!(kind = message.kind(), "failed to encode message: {err}");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                debug!("websocket receive error: {err}");
                break;
            }
        };
        match Message::from_json(text.as_str()) {
            Ok(message) => {
                debug!(kind = message.kind(), "peer message received");
                for reply in state.role.on_peer_message(message) {
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Err(err) => warn!("dropping peer message: {err}"),
        }
    }

    writer.abort();
    info!("websocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::chain::genesis_block;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let hub = ClientHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.client_count(), 2);

        hub.broadcast(Message::Block {
            block: genesis_block(),
        });
        assert_eq!(a.recv().await.unwrap().kind(), "BLOCK");
        assert_eq!(b.recv().await.unwrap().kind(), "BLOCK");
    }

    #[test]
    fn broadcast_without_clients_is_dropped() {
        let hub = ClientHub::new();
        hub.broadcast(Message::GetBlockchain);
        assert_eq!(hub.client_count(), 0);
    }
}
