use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use parley_types::events::GatewayEvent;

use crate::presence::PresenceRegistry;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl GatewayQuery {
    /// The handshake user id, if present and well-formed.
    pub fn parsed_user_id(&self) -> Option<Uuid> {
        let raw = self.user_id.as_deref().filter(|s| !s.is_empty())?;
        match raw.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                let shown: String = raw.chars().take(64).collect();
                warn!("Ignoring malformed gateway userId '{}'", shown);
                None
            }
        }
    }
}

pub async fn ws_upgrade(
    State(presence): State<PresenceRegistry>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let user_id = query.parsed_user_id();
    ws.on_upgrade(move |socket| handle_connection(socket, presence, user_id))
}

/// Run one WebSocket connection until either side closes.
///
/// Sockets that arrive without a user id still receive broadcasts but are
/// never the target of a push.
pub async fn handle_connection(socket: WebSocket, presence: PresenceRegistry, user_id: Option<Uuid>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe first so this socket sees the online list that includes itself
    let mut broadcast_rx = presence.subscribe();

    let (conn_id, mut user_rx) = match user_id {
        Some(uid) => {
            let (conn_id, rx) = presence.connect(uid).await;
            info!("User {} connected to gateway (conn {})", uid, conn_id);
            (Some(conn_id), Some(rx))
        }
        None => {
            debug!("Anonymous socket connected to gateway");
            presence.announce().await;
            (None, None)
        }
    };

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                event = recv_targeted(&mut user_rx) => {
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // The gateway is push-only; clients only need to answer pings and close.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                Message::Text(text) => {
                    trace!("Ignoring client text frame ({} bytes)", text.len());
                }
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    match (user_id, conn_id) {
        (Some(uid), Some(conn_id)) => {
            presence.disconnect(uid, conn_id).await;
            info!("User {} disconnected from gateway (conn {})", uid, conn_id);
        }
        _ => {
            presence.announce().await;
            debug!("Anonymous socket disconnected from gateway");
        }
    }
}

/// Next targeted event for this socket.
///
/// Pends forever for anonymous sockets, and for sockets whose user has since
/// connected elsewhere (the registry dropped their sender). Those keep
/// receiving broadcasts until they close.
async fn recv_targeted(rx: &mut Option<mpsc::UnboundedReceiver<GatewayEvent>>) -> GatewayEvent {
    if let Some(inner) = rx.as_mut() {
        if let Some(event) = inner.recv().await {
            return event;
        }
    }
    *rx = None;
    std::future::pending().await
}

/// Serialize and send one event. Returns `false` when the socket is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.name(), e);
            return true;
        }
    };

    sender.send(Message::Text(text.into())).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(raw: Option<&str>) -> GatewayQuery {
        GatewayQuery {
            user_id: raw.map(str::to_string),
        }
    }

    #[test]
    fn handshake_user_id_parsing() {
        let id = Uuid::new_v4();
        assert_eq!(query(Some(&id.to_string())).parsed_user_id(), Some(id));
        assert_eq!(query(None).parsed_user_id(), None);
        assert_eq!(query(Some("")).parsed_user_id(), None);
        assert_eq!(query(Some("not-a-uuid")).parsed_user_id(), None);
    }
}
