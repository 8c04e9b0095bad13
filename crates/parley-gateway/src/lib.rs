//! Real-time delivery: the presence registry that maps users to their live
//! socket, and the WebSocket connection loop that drains it.

pub mod connection;
pub mod presence;

use axum::{Router, routing::get};

use crate::presence::PresenceRegistry;

/// `GET /gateway?userId=<uuid>` WebSocket endpoint.
pub fn router(presence: PresenceRegistry) -> Router {
    Router::new()
        .route("/gateway", get(connection::ws_upgrade))
        .with_state(presence)
}
