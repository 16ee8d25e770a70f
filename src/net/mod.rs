//! Network layer: WebSocket endpoint, connection bookkeeping, the wire
//! protocol and the per-match actor.

pub mod connection;
pub mod match_session;
pub mod protocol;
pub mod server;
