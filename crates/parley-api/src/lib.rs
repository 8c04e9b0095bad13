//! HTTP surface of the Parley backend: accounts, the user directory and
//! direct messages. Message text is encrypted before it reaches storage and
//! decrypted before it leaves this crate.

pub mod auth;
pub mod delivery;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod rows;
pub mod state;
pub mod uploads;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;
