//! Live broadcast gateway.
//!
//! One lossy `tokio::sync::broadcast` channel feeds every `/ws/live`
//! connection. Messages are not targeted: each socket receives every
//! broadcast and clients filter on `liveSessionId`.

use std::sync::Arc;

use axum::{
    extract::{
        Extension,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use classroom_live::LiveBroadcast;

use crate::app::services::AppServices;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct LiveGateway {
    tx: broadcast::Sender<LiveBroadcast>,
}

impl LiveGateway {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Fan out to every open connection. Returns how many received it.
    pub fn publish(&self, message: LiveBroadcast) -> usize {
        let session = message.live_session_id();
        match self.tx.send(message) {
            Ok(receivers) => {
                tracing::debug!(live_session_id = %session, receivers, "live broadcast sent");
                receivers
            }
            // No open sockets; nothing to deliver.
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveBroadcast> {
        self.tx.subscribe()
    }

    pub fn connection_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LiveGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /ws/live`
pub async fn ws_live(ws: WebSocketUpgrade, Extension(services): Extension<Arc<AppServices>>) -> Response {
    let rx = services.gateway().subscribe();
    ws.on_upgrade(move |socket| serve_socket(socket, rx))
}

async fn serve_socket(mut socket: WebSocket, rx: broadcast::Receiver<LiveBroadcast>) {
    let mut stream = BroadcastStream::new(rx);
    tracing::debug!("live socket connected");

    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(Ok(message)) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to serialize live broadcast");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "live socket lagged behind broadcast");
                }
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Viewers only listen; anything they send is ignored.
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("live socket closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_core::LiveSessionId;

    #[tokio::test]
    async fn every_subscriber_receives_every_broadcast() {
        let gateway = LiveGateway::new();
        let mut a = gateway.subscribe();
        let mut b = gateway.subscribe();
        assert_eq!(gateway.connection_count(), 2);

        let msg = LiveBroadcast::SessionEnded {
            live_session_id: LiveSessionId::new(),
        };
        assert_eq!(gateway.publish(msg.clone()), 2);
        assert_eq!(a.recv().await.unwrap(), msg);
        assert_eq!(b.recv().await.unwrap(), msg);
    }

    #[test]
    fn publishing_without_listeners_is_harmless() {
        let gateway = LiveGateway::new();
        let msg = LiveBroadcast::SessionEnded {
            live_session_id: LiveSessionId::new(),
        };
        assert_eq!(gateway.publish(msg), 0);
    }
}
