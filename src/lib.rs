//! Realtime messaging core: connection registry, presence, room fan-out, and
//! the message pipeline (send, receipts, reactions, pins, revocation,
//! forwarding) behind a WebSocket endpoint.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod push;
pub mod services;
pub mod state;
pub mod storage;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;
