//! Wire protocol
//!
//! JSON type-tagged messages over the WebSocket. Every frame is an object
//! with a camelCase `type` field; unknown or malformed frames decode to an
//! error and are dropped by the connection layer without disconnecting.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::constants::net;
use crate::game::state::{Ball, GameSettings, Paddle, PlayerNumber, PongState, Score};

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Start the game once both seats are filled.
    StartGame,
    /// Absolute paddle position intent. `player_number` stays a raw u8 so
    /// an out-of-range claim reaches validation instead of failing decode.
    #[serde(rename_all = "camelCase")]
    MovePaddle {
        player_number: u8,
        paddle_position: f32,
        input_sequence: u64,
    },
    /// Ask for a rematch after a finished game.
    RematchRequest,
    /// Client-initiated liveness probe; answered with `pong`.
    Ping { timestamp: u64 },
    /// Reply to a server-initiated `ping`.
    Pong { timestamp: u64 },
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Seat assignment, sent once right after a successful join.
    #[serde(rename_all = "camelCase")]
    PlayerNumber { player_number: PlayerNumber },
    /// Greeting carrying the opaque match id.
    #[serde(rename_all = "camelCase")]
    Connected { message: String, game_id: String },
    /// Current match settings; pushed to a joiner entering an occupied
    /// match.
    SettingsUpdate { settings: GameSettings },
    /// Authoritative snapshot. `player_number` tags the recipient's seat
    /// when the snapshot is addressed rather than broadcast.
    #[serde(rename_all = "camelCase")]
    GameState {
        game_state: GameStateSnapshot,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_number: Option<PlayerNumber>,
    },
    /// Protocol violation that warrants a reply.
    Error { message: String },
    /// The opponent asked for a rematch.
    RematchRequested { player: PlayerNumber },
    /// Rematch handshake complete; state has been reset.
    Rematch,
    /// The opponent's connection went away. `winner` is set when the
    /// departure forfeited a running game.
    OpponentDisconnected {
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<PlayerNumber>,
    },
    /// Server-initiated liveness probe.
    Ping { timestamp: u64 },
    /// Reply to a client-initiated `ping`.
    Pong { timestamp: u64 },
}

/// Paddle as it appears on the wire (no internal velocity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaddleSnapshot {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl From<&Paddle> for PaddleSnapshot {
    fn from(p: &Paddle) -> Self {
        Self {
            x: p.x,
            y: p.y,
            width: p.width,
            height: p.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub speed_x: f32,
    pub speed_y: f32,
}

impl From<&Ball> for BallSnapshot {
    fn from(b: &Ball) -> Self {
        Self {
            x: b.x,
            y: b.y,
            radius: b.radius,
            speed_x: b.speed_x,
            speed_y: b.speed_y,
        }
    }
}

/// Both paddles, selected by seat rather than by a stringly-typed key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaddlePairSnapshot {
    pub player1: PaddleSnapshot,
    pub player2: PaddleSnapshot,
}

/// Full authoritative snapshot broadcast to both seats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateSnapshot {
    pub paddles: PaddlePairSnapshot,
    pub ball: BallSnapshot,
    pub score: Score,
    pub serving_player: PlayerNumber,
    pub game_started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerNumber>,
    pub tick: u64,
}

impl GameStateSnapshot {
    pub fn from_state(state: &PongState) -> Self {
        Self {
            paddles: PaddlePairSnapshot {
                player1: (&state.paddle1).into(),
                player2: (&state.paddle2).into(),
            },
            ball: (&state.ball).into(),
            score: state.score,
            serving_player: state.serving_player,
            game_started: state.game_started,
            winner: state.winner,
            tick: state.tick,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Serialize a server message to a text frame.
pub fn encode(message: &ServerMessage) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(message)?)
}

/// Parse a text frame into a client message.
pub fn decode(text: &str) -> Result<ClientMessage, DecodeError> {
    if text.len() > net::MAX_FRAME_BYTES {
        return Err(DecodeError::FrameTooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn encoded_value(message: &ServerMessage) -> Value {
        serde_json::from_str(&encode(message).unwrap()).unwrap()
    }

    #[test]
    fn test_decode_start_game() {
        let msg = decode(r#"{"type":"startGame"}"#).unwrap();
        assert_eq!(msg, ClientMessage::StartGame);
    }

    #[test]
    fn test_decode_move_paddle() {
        let msg = decode(
            r#"{"type":"movePaddle","playerNumber":2,"paddlePosition":312.5,"inputSequence":41}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::MovePaddle {
                player_number: 2,
                paddle_position: 312.5,
                input_sequence: 41,
            }
        );
    }

    #[test]
    fn test_decode_move_paddle_keeps_bogus_seat_claim() {
        // Seat validation happens in the session layer, not at decode time
        let msg = decode(
            r#"{"type":"movePaddle","playerNumber":7,"paddlePosition":10.0,"inputSequence":1}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::MovePaddle { player_number: 7, .. }));
    }

    #[test]
    fn test_decode_rematch_and_heartbeat() {
        assert_eq!(
            decode(r#"{"type":"rematchRequest"}"#).unwrap(),
            ClientMessage::RematchRequest
        );
        assert_eq!(
            decode(r#"{"type":"ping","timestamp":1700000000000}"#).unwrap(),
            ClientMessage::Ping {
                timestamp: 1_700_000_000_000
            }
        );
        assert_eq!(
            decode(r#"{"type":"pong","timestamp":12}"#).unwrap(),
            ClientMessage::Pong { timestamp: 12 }
        );
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(decode(r#"{"type":"launchMissiles"}"#).is_err());
        assert!(decode(r#"{"paddlePosition":1.0}"#).is_err());
        assert!(decode("not json at all").is_err());
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let huge = format!(
            r#"{{"type":"movePaddle","playerNumber":1,"paddlePosition":1.0,"inputSequence":1,"pad":"{}"}}"#,
            "x".repeat(net::MAX_FRAME_BYTES)
        );
        assert!(matches!(decode(&huge), Err(DecodeError::FrameTooLarge(_))));
    }

    #[test]
    fn test_encode_player_number() {
        let value = encoded_value(&ServerMessage::PlayerNumber {
            player_number: PlayerNumber::Two,
        });
        assert_eq!(value, json!({"type": "playerNumber", "playerNumber": 2}));
    }

    #[test]
    fn test_encode_connected() {
        let value = encoded_value(&ServerMessage::Connected {
            message: "welcome".to_string(),
            game_id: "abc-123".to_string(),
        });
        assert_eq!(
            value,
            json!({"type": "connected", "message": "welcome", "gameId": "abc-123"})
        );
    }

    #[test]
    fn test_encode_settings_update_uses_camel_case() {
        let value = encoded_value(&ServerMessage::SettingsUpdate {
            settings: GameSettings::default(),
        });
        assert_eq!(value["type"], "settingsUpdate");
        let settings = &value["settings"];
        assert!(settings.get("ballSpeed").is_some());
        assert!(settings.get("paddleHeight").is_some());
        assert!(settings.get("winScore").is_some());
        assert!(settings.get("powerUps").is_some());
        assert!(settings.get("ball_speed").is_none(), "no snake_case on the wire");
    }

    #[test]
    fn test_encode_game_state_broadcast_omits_optional_fields() {
        let state = PongState::new(&GameSettings::default());
        let value = encoded_value(&ServerMessage::GameState {
            game_state: GameStateSnapshot::from_state(&state),
            player_number: None,
        });

        assert_eq!(value["type"], "gameState");
        assert!(value.get("playerNumber").is_none());
        let snapshot = &value["gameState"];
        assert!(snapshot.get("winner").is_none());
        assert_eq!(snapshot["gameStarted"], json!(false));
        assert_eq!(snapshot["servingPlayer"], json!(1));
        assert!(snapshot["paddles"].get("player1").is_some());
        assert!(snapshot["paddles"].get("player2").is_some());
        assert!(snapshot["ball"].get("speedX").is_some());
        assert_eq!(snapshot["score"], json!({"player1": 0, "player2": 0}));
    }

    #[test]
    fn test_encode_game_state_addressed_to_a_seat() {
        let mut state = PongState::new(&GameSettings::default());
        state.winner = Some(PlayerNumber::One);
        let value = encoded_value(&ServerMessage::GameState {
            game_state: GameStateSnapshot::from_state(&state),
            player_number: Some(PlayerNumber::Two),
        });

        assert_eq!(value["playerNumber"], json!(2));
        assert_eq!(value["gameState"]["winner"], json!(1));
    }

    #[test]
    fn test_encode_opponent_disconnected() {
        let without_winner = encoded_value(&ServerMessage::OpponentDisconnected { winner: None });
        assert_eq!(without_winner, json!({"type": "opponentDisconnected"}));

        let with_winner = encoded_value(&ServerMessage::OpponentDisconnected {
            winner: Some(PlayerNumber::One),
        });
        assert_eq!(
            with_winner,
            json!({"type": "opponentDisconnected", "winner": 1})
        );
    }

    #[test]
    fn test_encode_rematch_messages() {
        assert_eq!(
            encoded_value(&ServerMessage::RematchRequested {
                player: PlayerNumber::Two
            }),
            json!({"type": "rematchRequested", "player": 2})
        );
        assert_eq!(encoded_value(&ServerMessage::Rematch), json!({"type": "rematch"}));
    }

    #[test]
    fn test_encode_error_and_heartbeat() {
        assert_eq!(
            encoded_value(&ServerMessage::Error {
                message: "nope".to_string()
            }),
            json!({"type": "error", "message": "nope"})
        );
        assert_eq!(
            encoded_value(&ServerMessage::Ping { timestamp: 77 }),
            json!({"type": "ping", "timestamp": 77})
        );
        assert_eq!(
            encoded_value(&ServerMessage::Pong { timestamp: 78 }),
            json!({"type": "pong", "timestamp": 78})
        );
    }

    #[test]
    fn test_snapshot_tracks_state() {
        let mut state = PongState::new(&GameSettings::default());
        state.paddle1.set_position(123.0);
        state.ball.speed_x = 4.5;
        state.score.increment(PlayerNumber::Two);
        state.tick = 99;

        let snapshot = GameStateSnapshot::from_state(&state);
        assert_eq!(snapshot.paddles.player1.y, 123.0);
        assert_eq!(snapshot.ball.speed_x, 4.5);
        assert_eq!(snapshot.score.player2, 1);
        assert_eq!(snapshot.tick, 99);
    }
}
