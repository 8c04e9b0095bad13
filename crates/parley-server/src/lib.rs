//! Wiring for the `parley` binary: configuration and router assembly.

pub mod app;
pub mod config;
