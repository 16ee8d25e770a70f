use std::time::{Duration, Instant};

use crate::game::state::PlayerNumber;
use crate::net::connection::ConnectionId;

/// One occupied seat in a match.
///
/// Holds a non-owning connection id only; the connection registry turns
/// ids into live send handles on demand, so a slot never pins a dead
/// socket.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub connection_id: ConnectionId,
    pub player_number: PlayerNumber,
    /// Highest input sequence accepted from this seat
    pub last_input_sequence: u64,
    pub last_seen: Instant,
    pub joined_at: Instant,
}

impl PlayerSlot {
    pub fn new(connection_id: ConnectionId, player_number: PlayerNumber) -> Self {
        let now = Instant::now();
        Self {
            connection_id,
            player_number,
            last_input_sequence: 0,
            last_seen: now,
            joined_at: now,
        }
    }

    /// Bump liveness on any inbound traffic from this seat.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Commit an accepted input sequence and bump liveness.
    pub fn record_input(&mut self, sequence: u64) {
        self.last_input_sequence = sequence;
        self.touch();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.elapsed()
    }
}
