//! Shared types for the Parley chat backend: REST payloads, gateway events
//! and domain models.

pub mod api;
pub mod events;
pub mod models;
