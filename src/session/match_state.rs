//! Per-match state machine: two seats, a lifecycle phase, and the rules
//! for joining, starting, forfeits and the rematch handshake. This type
//! is pure state; the network actor drives it and owns all I/O.

use std::collections::HashMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::game::physics::{self, TickEvent};
use crate::game::state::{GameSettings, PlayerNumber, PongState};
use crate::net::connection::ConnectionId;
use crate::session::input::{self, InputRejection};
use crate::session::slot::PlayerSlot;

/// Lifecycle phase of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Seats filling up; board idle until a start request
    Lobby,
    /// Simulation ticking at the fixed rate
    Active,
    /// One player left mid-match; the survivor holds the board and
    /// waits for a fresh opponent
    ForfeitPending,
    /// Game finished with both players still seated; rematch window open
    RematchPending,
    /// Both seats empty; the registry drops the match
    Closed,
}

/// Operations rejected by the state machine. The `Display` text is what
/// clients see in `error` frames.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("Match already has two players")]
    MatchFull,
    #[error("Match is closed")]
    MatchClosed,
    #[error("Waiting for an opponent to join")]
    WaitingForOpponent,
    #[error("Game already in progress")]
    AlreadyStarted,
    #[error("Game is over; request a rematch instead")]
    RematchRequired,
    #[error("No finished game to rematch")]
    RematchUnavailable,
    #[error("Only the serving player can start the round")]
    NotYourServe,
    #[error("Connection holds no seat in this match")]
    NotSeated,
}

/// What a rematch request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RematchOutcome {
    /// First request of the pair; the opponent should be told
    Recorded { by: PlayerNumber },
    /// Both seats agreed; the board is reset and back in the lobby
    Restarted,
    /// Same seat asked again
    Duplicate,
}

/// What a disconnect did to the match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// Connection held no seat here; nothing changed
    NotSeated,
    /// A player left a running game; the survivor wins by walkover
    Forfeit { winner: PlayerNumber },
    /// A player left outside a running game; the survivor keeps the board
    OpponentLeft { remaining: PlayerNumber },
    /// Last seat emptied; the match is finished
    Closed,
}

/// One two-player match: seat bookkeeping plus the authoritative
/// simulation state.
pub struct Match {
    id: String,
    phase: MatchPhase,
    state: PongState,
    settings: GameSettings,
    slots: HashMap<ConnectionId, PlayerSlot>,
    rematch_requested_by: Option<PlayerNumber>,
    rng: StdRng,
    created_at: Instant,
}

impl Match {
    pub fn new(id: impl Into<String>, settings: GameSettings) -> Self {
        Self::with_rng(id, settings, StdRng::from_entropy())
    }

    /// Deterministic constructor for tests and benchmarks.
    pub fn with_rng(id: impl Into<String>, settings: GameSettings, mut rng: StdRng) -> Self {
        let mut state = PongState::new(&settings);
        state.serving_player = PlayerNumber::random(&mut rng);
        Self {
            id: id.into(),
            phase: MatchPhase::Lobby,
            state,
            settings,
            slots: HashMap::new(),
            rematch_requested_by: None,
            rng,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn state(&self) -> &PongState {
        &self.state
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn player_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= 2
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot held by a connection, if any.
    pub fn slot_of(&self, connection_id: ConnectionId) -> Option<&PlayerSlot> {
        self.slots.get(&connection_id)
    }

    /// Slot occupying a seat, if any.
    pub fn slot(&self, number: PlayerNumber) -> Option<&PlayerSlot> {
        self.slots.values().find(|s| s.player_number == number)
    }

    /// Seat held by a connection, if any.
    pub fn seat_of(&self, connection_id: ConnectionId) -> Option<PlayerNumber> {
        self.slot_of(connection_id).map(|s| s.player_number)
    }

    /// Connection currently holding a seat, if any.
    pub fn connection_of(&self, number: PlayerNumber) -> Option<ConnectionId> {
        self.slot(number).map(|s| s.connection_id)
    }

    /// Connections to fan a broadcast out to.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.slots.keys().copied().collect()
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Seat a connection. The lowest free seat is assigned, so a seat
    /// freed by a disconnect is handed to the next joiner. Joining again
    /// on the same connection returns the seat already held. A join while
    /// a walkover is pending pairs the survivor into a fresh game first.
    pub fn join(&mut self, connection_id: ConnectionId) -> Result<PlayerNumber, MatchError> {
        if self.phase == MatchPhase::Closed {
            return Err(MatchError::MatchClosed);
        }
        if let Some(slot) = self.slots.get(&connection_id) {
            return Ok(slot.player_number);
        }
        let number = self.free_seat().ok_or(MatchError::MatchFull)?;

        if self.phase == MatchPhase::ForfeitPending {
            self.state.reset_for_rematch(&mut self.rng);
            self.rematch_requested_by = None;
            self.phase = MatchPhase::Lobby;
        }

        self.slots
            .insert(connection_id, PlayerSlot::new(connection_id, number));
        Ok(number)
    }

    fn free_seat(&self) -> Option<PlayerNumber> {
        if self.connection_of(PlayerNumber::One).is_none() {
            Some(PlayerNumber::One)
        } else if self.connection_of(PlayerNumber::Two).is_none() {
            Some(PlayerNumber::Two)
        } else {
            None
        }
    }

    /// Start the game. Only the serving player may ask, and only from a
    /// full lobby; after a win the rematch handshake is the only way back.
    pub fn start_game(&mut self, connection_id: ConnectionId) -> Result<(), MatchError> {
        if !self.slots.contains_key(&connection_id) {
            return Err(MatchError::NotSeated);
        }
        match self.phase {
            MatchPhase::Lobby => {}
            MatchPhase::Active => return Err(MatchError::AlreadyStarted),
            MatchPhase::RematchPending => return Err(MatchError::RematchRequired),
            MatchPhase::ForfeitPending => return Err(MatchError::WaitingForOpponent),
            MatchPhase::Closed => return Err(MatchError::MatchClosed),
        }
        if self.slots.len() < 2 {
            return Err(MatchError::WaitingForOpponent);
        }
        if self.seat_of(connection_id) != Some(self.state.serving_player) {
            return Err(MatchError::NotYourServe);
        }

        let server = self.state.serving_player;
        self.state.game_started = true;
        self.state
            .serve_toward(server, self.settings.ball_speed, &mut self.rng);
        self.phase = MatchPhase::Active;
        Ok(())
    }

    /// Apply a validated paddle input. Sequence numbers are tracked per
    /// seat, so reordered or replayed frames fall out here. Moves are
    /// accepted in any phase a seat exists in; outside a running game
    /// they just reposition the idle paddle.
    pub fn move_paddle(
        &mut self,
        connection_id: ConnectionId,
        claimed: u8,
        position: f32,
        sequence: u64,
    ) -> Result<(), InputRejection> {
        let slot = match self.slots.get_mut(&connection_id) {
            Some(slot) => slot,
            None => return Err(InputRejection::NotSeated),
        };
        input::validate_move(
            slot.player_number,
            claimed,
            position,
            slot.last_input_sequence,
            sequence,
        )?;
        let number = slot.player_number;
        slot.record_input(sequence);
        self.state.paddle_mut(number).set_position(position);
        Ok(())
    }

    /// Advance the simulation by one tick. Outside the active phase this
    /// is a no-op. A win closes the game and opens the rematch window.
    pub fn tick(&mut self) -> Vec<TickEvent> {
        if self.phase != MatchPhase::Active {
            return Vec::new();
        }
        let events = physics::step(&mut self.state, &self.settings, &mut self.rng);
        for event in &events {
            if matches!(event, TickEvent::GameWon { .. }) {
                self.phase = MatchPhase::RematchPending;
                self.rematch_requested_by = None;
            }
        }
        events
    }

    /// Record a rematch request. The first request arms the handshake;
    /// the opposite seat's request completes it and returns the match to
    /// a fresh lobby.
    pub fn request_rematch(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<RematchOutcome, MatchError> {
        let number = self
            .slots
            .get(&connection_id)
            .map(|s| s.player_number)
            .ok_or(MatchError::NotSeated)?;
        if self.phase != MatchPhase::RematchPending {
            return Err(MatchError::RematchUnavailable);
        }
        match self.rematch_requested_by {
            None => {
                self.rematch_requested_by = Some(number);
                Ok(RematchOutcome::Recorded { by: number })
            }
            Some(existing) if existing == number => Ok(RematchOutcome::Duplicate),
            Some(_) => {
                self.state.reset_for_rematch(&mut self.rng);
                self.rematch_requested_by = None;
                self.phase = MatchPhase::Lobby;
                Ok(RematchOutcome::Restarted)
            }
        }
    }

    /// Remove a connection's seat and settle the consequences. Safe to
    /// call for connections that never joined or already left.
    pub fn handle_disconnect(&mut self, connection_id: ConnectionId) -> DisconnectOutcome {
        let slot = match self.slots.remove(&connection_id) {
            Some(slot) => slot,
            None => return DisconnectOutcome::NotSeated,
        };

        if self.slots.is_empty() {
            self.phase = MatchPhase::Closed;
            return DisconnectOutcome::Closed;
        }

        let remaining = slot.player_number.opponent();
        match self.phase {
            MatchPhase::Active => {
                self.state.winner = Some(remaining);
                self.state.game_started = false;
                self.state.ball.stop();
                self.rematch_requested_by = None;
                self.phase = MatchPhase::ForfeitPending;
                DisconnectOutcome::Forfeit { winner: remaining }
            }
            MatchPhase::Lobby => DisconnectOutcome::OpponentLeft { remaining },
            MatchPhase::RematchPending => {
                // The finished game's winner stands; only the handshake dies.
                self.rematch_requested_by = None;
                self.phase = MatchPhase::ForfeitPending;
                DisconnectOutcome::OpponentLeft { remaining }
            }
            // These phases never hold two seats, so the empty check above
            // already covered them.
            MatchPhase::ForfeitPending | MatchPhase::Closed => {
                DisconnectOutcome::OpponentLeft { remaining }
            }
        }
    }
}
