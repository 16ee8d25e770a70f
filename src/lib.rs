//! Pong Duel Server Library
//!
//! A server-authoritative real-time Pong server. Each match runs its own
//! 60 Hz simulation task; clients connect over WebSockets, occupy one of
//! two player slots, and exchange JSON type-tagged messages with the
//! authoritative simulation.

pub mod config;
pub mod game;
pub mod metrics;
pub mod net;
pub mod session;
