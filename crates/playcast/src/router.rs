//! Response router and WebSocket handler
//!
//! Every WebSocket client subscribes to the shared observer broadcast and
//! receives each [`playcast_core::Response`] as a JSON text frame, in the
//! order the connectors published them. A client that falls behind skips the
//! events it missed and carries on from the oldest one still buffered.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

/// Greeting sent to every client on join
pub const GREETING: &str = "Connected";

/// Ping interval (send a ping every 15 seconds)
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Fan-out of connector responses to WebSocket clients
#[derive(Clone)]
pub struct ResponseRouter {
    observer: broadcast::Sender<playcast_core::Response>,
}

impl ResponseRouter {
    /// Create a router over the connectors' observer channel
    pub fn new(observer: broadcast::Sender<playcast_core::Response>) -> Self {
        Self { observer }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(router): State<ResponseRouter>) -> Response {
    info!("WebSocket upgrade accepted");
    ws.on_upgrade(move |socket| handle_client(socket, router))
}

/// Handle a WebSocket client connection
async fn handle_client(mut socket: WebSocket, router: ResponseRouter) {
    // Subscribe before greeting so nothing published after the greeting is missed.
    let mut responses = router.observer.subscribe();

    if socket.send(Message::Text(GREETING.into())).await.is_err() {
        info!("Client disconnected before greeting");
        return;
    }
    info!("Client connected");

    let mut heartbeat = time::interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            result = responses.recv() => {
                match result {
                    Ok(response) => {
                        let text = match serde_json::to_string(&response) {
                            Ok(text) => text,
                            Err(e) => {
                                error!("Failed to encode response: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            info!("Client disconnected");
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged {} responses, skipping ahead", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Observer channel closed");
                        return;
                    }
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client disconnected");
                        return;
                    }
                    Some(Ok(_)) => {
                        // Clients only listen; text, binary and pongs are ignored.
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        return;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                    info!("Client disconnected during ping");
                    return;
                }
                debug!("Ping sent to client");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_interval() {
        assert_eq!(HEARTBEAT_INTERVAL, Duration::from_secs(15));
    }

    #[test]
    fn test_router_shares_observer() {
        let (observer, _) = broadcast::channel(4);
        let router = ResponseRouter::new(observer.clone());
        let mut rx = router.observer.subscribe();
        assert_eq!(observer.receiver_count(), 2);
        drop(router);

        let response = playcast_core::Response {
            connector: "channel0".to_string(),
            message: playcast_core::Message::new(playcast_core::Word::End),
        };
        observer.send(response.clone()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), response);
    }
}
