//! Validation of `movePaddle` payloads before they touch the simulation.

use crate::game::state::PlayerNumber;

/// Reasons a paddle input is rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputRejection {
    #[error("Connection holds no seat in this match")]
    NotSeated,
    #[error("Input claims player {claimed} but sender holds seat {actual}")]
    WrongSlot { claimed: u8, actual: u8 },
    #[error("NaN or Infinity in paddle position")]
    NonFinite,
    #[error("Input sequence went backwards or repeated: prev={last}, current={got}")]
    StaleSequence { last: u64, got: u64 },
}

impl InputRejection {
    /// Only ownership violations get an `error` reply; stale or garbage
    /// inputs are dropped quietly because they occur in normal operation
    /// (reordering, races with disconnects).
    pub fn warrants_reply(&self) -> bool {
        matches!(self, InputRejection::WrongSlot { .. })
    }
}

/// Check a move intent against the sender's seat. `claimed` stays the raw
/// wire byte so that impossible seat numbers fall out here rather than at
/// decode time. Sequence numbers must be strictly increasing per seat.
pub fn validate_move(
    actual: PlayerNumber,
    claimed: u8,
    position: f32,
    last_sequence: u64,
    sequence: u64,
) -> Result<(), InputRejection> {
    if claimed != u8::from(actual) {
        return Err(InputRejection::WrongSlot {
            claimed,
            actual: u8::from(actual),
        });
    }

    if !position.is_finite() {
        return Err(InputRejection::NonFinite);
    }

    if sequence <= last_sequence {
        return Err(InputRejection::StaleSequence {
            last: last_sequence,
            got: sequence,
        });
    }

    Ok(())
}
