use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events pushed to clients over the WebSocket gateway.
///
/// Serialized as `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum GatewayEvent {
    /// Full list of user ids that currently hold a live connection.
    /// Sent to every socket on each connect/disconnect.
    GetOnlineUsers(Vec<Uuid>),

    /// A message addressed to the receiving user. Text is plaintext.
    NewMessage(Message),
}

impl GatewayEvent {
    /// Wire name of the event, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetOnlineUsers(_) => "getOnlineUsers",
            Self::NewMessage(_) => "newMessage",
        }
    }
}
