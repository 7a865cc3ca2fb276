//! WebSocket transport

pub mod handler;
pub mod ingress;
pub mod protocol;
