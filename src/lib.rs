//! Permadeth world server: authoritative tick loop, turn-based duels and the
//! client-side reconciliation logic that shares its constants.

pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod store;
pub mod util;
pub mod ws;
