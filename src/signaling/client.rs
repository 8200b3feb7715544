//! WebSocket signaling client for the relay connection
//!
//! Owns exactly one logical connection to the relay. Outbound messages go
//! through an unbounded queue so callers never block; inbound frames are
//! decoded and forwarded on a single event channel in arrival order, which
//! is what keeps offer-before-candidate sequencing intact for the
//! negotiation layer.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::protocol::SignalingMessage;
use crate::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event surfaced by the signaling transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    /// The relay connection is established (fires again after a reconnect;
    /// a session sees the second occurrence as invalidation)
    Connected,

    /// A decoded inbound message, delivered in arrival order
    Message(SignalingMessage),
}

/// WebSocket signaling client
///
/// `connect` spawns the connection task and hands back the event receiver;
/// the receiver is the single consumer, so delivery to the negotiation
/// layer is serialized.
pub struct SignalingClient {
    /// Outbound message queue; held across disconnects and drained
    /// once the connection is (re-)established
    outbound: mpsc::UnboundedSender<SignalingMessage>,

    /// Shutdown signal for the connection task
    shutdown: watch::Sender<bool>,
}

impl SignalingClient {
    /// Connect to the signaling relay
    ///
    /// Returns immediately; the connection is established in the background
    /// and a `SignalingEvent::Connected` is emitted once it is up. Connect
    /// failures schedule a retry after `reconnect_delay` instead of failing
    /// the caller.
    pub fn connect(
        url: String,
        reconnect_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SignalingEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(connection_task(
            url,
            reconnect_delay,
            outbound_rx,
            event_tx,
            shutdown_rx,
        ));

        (
            Self {
                outbound: outbound_tx,
                shutdown: shutdown_tx,
            },
            event_rx,
        )
    }

    /// Enqueue a message for the relay
    ///
    /// Never blocks. If the connection is currently down the message is held
    /// until the queue drains after reconnect (at-most-once delivery; no
    /// durability across process restart).
    pub fn send(&self, message: SignalingMessage) -> Result<()> {
        self.outbound.send(message).map_err(|_| {
            Error::SignalingError("signaling connection task has shut down".to_string())
        })
    }

    /// Clone of the outbound queue handle, for components that enqueue
    /// messages without owning the client
    pub fn sender(&self) -> mpsc::UnboundedSender<SignalingMessage> {
        self.outbound.clone()
    }

    /// Close the connection and cancel any pending reconnect
    ///
    /// Idempotent.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Connection task: connect, run, reconnect until shut down
async fn connection_task(
    url: String,
    reconnect_delay: Duration,
    mut outbound_rx: mpsc::UnboundedReceiver<SignalingMessage>,
    event_tx: mpsc::UnboundedSender<SignalingEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let ws = tokio::select! {
            res = connect_async(url.as_str()) => match res {
                Ok((ws, _)) => Some(ws),
                Err(e) => {
                    warn!("Failed to connect to signaling relay {}: {}", url, e);
                    None
                }
            },
            _ = shutdown_rx.changed() => break,
        };

        if let Some(ws) = ws {
            info!("Connected to signaling relay: {}", url);
            if event_tx.send(SignalingEvent::Connected).is_err() {
                break;
            }

            run_connection(ws, &mut outbound_rx, &event_tx, &mut shutdown_rx).await;

            if *shutdown_rx.borrow() {
                break;
            }
            warn!(
                "Signaling connection lost, reconnecting in {}ms",
                reconnect_delay.as_millis()
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Signaling connection task terminated");
}

/// Drive one established connection until it drops or shutdown is signaled
async fn run_connection(
    ws: WsStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<SignalingMessage>,
    event_tx: &mpsc::UnboundedSender<SignalingEvent>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            Some(msg) = outbound_rx.recv() => {
                let kind = msg.kind();
                match msg.to_json() {
                    Ok(json) => {
                        debug!("Sending {} to relay", kind);
                        if let Err(e) = write.send(Message::Text(json)).await {
                            warn!("Failed to send {}: {}", kind, e);
                            return;
                        }
                    }
                    Err(e) => warn!("Dropping unserializable {}: {}", kind, e),
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match SignalingMessage::from_json(&text) {
                            Ok(msg) => {
                                debug!("Received {} from relay", msg.kind());
                                if event_tx.send(SignalingEvent::Message(msg)).is_err() {
                                    return;
                                }
                            }
                            // One bad frame never takes the connection down
                            Err(e) => warn!("Dropping undecodable frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Signaling relay closed the connection");
                        return;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        return;
                    }
                    None => return,
                    _ => {} // ping/pong/binary ignored
                }
            }

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    let _ = write.close().await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_while_disconnected_is_queued() {
        // Nothing listens on this port; the client must still accept sends
        let (client, _events) = SignalingClient::connect(
            "ws://127.0.0.1:9".to_string(),
            Duration::from_millis(50),
        );

        assert!(client.send(SignalingMessage::offer("v=0...x")).is_ok());
        client.close();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _events) = SignalingClient::connect(
            "ws://127.0.0.1:9".to_string(),
            Duration::from_millis(50),
        );

        client.close();
        client.close();
    }
}
