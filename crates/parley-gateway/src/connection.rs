use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::dispatcher::Gateway;
use crate::protocol::Flow;
use crate::router::encode;

/// Default heartbeat interval: the server sends a Ping every 30 seconds. A
/// connection that has not answered the previous Ping is dropped.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on an inbound WebSocket message.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// How long queued frames may take to flush after the reader stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pong bookkeeping shared by a connection's reader and writer. A fresh
/// connection counts as alive until its first tick.
#[derive(Debug)]
pub struct Liveness {
    acked: AtomicBool,
}

impl Default for Liveness {
    fn default() -> Self {
        Self {
            acked: AtomicBool::new(true),
        }
    }
}

impl Liveness {
    /// Record a pong.
    pub fn ack(&self) {
        self.acked.store(true, Ordering::Release);
    }

    /// Called on every heartbeat tick. Returns false if nothing was
    /// acknowledged since the previous tick; otherwise re-arms for the next.
    pub fn tick(&self) -> bool {
        self.acked.swap(false, Ordering::AcqRel)
    }
}

/// Drive one WebSocket connection until either side closes it.
pub async fn handle_connection(socket: WebSocket, gateway: Gateway) {
    let (mut sender, mut receiver) = socket.split();

    let (session_id, mut session_rx) = match gateway.connect().await {
        Ok(admitted) => admitted,
        Err(e) => {
            warn!("Rejecting connection: {}", e);
            if let Some(frame) = encode(&e.to_event()) {
                let _ = sender.send(Message::Text(frame.to_string().into())).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    info!("Session {} connected", session_id);

    let heartbeat_period = gateway.heartbeat();

    let liveness = Arc::new(Liveness::default());
    let liveness_recv = liveness.clone();

    // Forward queued frames -> client, with heartbeat. The queue closes when
    // the session is deregistered.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_period);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                frame = session_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                        return;
                    }
                }
                _ = heartbeat.tick() => {
                    if !liveness.tick() {
                        warn!("Session {} missed a heartbeat, dropping connection", session_id);
                        return;
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        return;
                    }
                }
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Read commands from client
    let gateway_recv = gateway.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if gateway_recv.handle_text(session_id, text.as_str()).await == Flow::Close {
                        break;
                    }
                }
                Message::Pong(_) => {
                    liveness_recv.ack();
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            gateway.disconnect(session_id).await;
        }
        _ = &mut recv_task => {
            gateway.disconnect(session_id).await;
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
    }

    info!("Session {} disconnected", session_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_peer_fails_the_second_tick() {
        let liveness = Liveness::default();
        assert!(liveness.tick());
        assert!(!liveness.tick());
    }

    #[test]
    fn each_pong_buys_one_more_interval() {
        let liveness = Liveness::default();
        for _ in 0..3 {
            assert!(liveness.tick());
            liveness.ack();
        }
        assert!(liveness.tick());
        assert!(!liveness.tick());
    }
}
