//! Game state definitions and structures
//!
//! Contains the two paddles, the ball, the score, and the per-match
//! settings snapshot. All coordinates use the top-left origin of the
//! 800x600 field; `y` on a paddle is the center of the paddle.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::constants::{ball, field, paddle, score};

/// Which of the two seats a player occupies. Serialized as `1` / `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PlayerNumber {
    One,
    Two,
}

impl PlayerNumber {
    pub fn opponent(self) -> Self {
        match self {
            PlayerNumber::One => PlayerNumber::Two,
            PlayerNumber::Two => PlayerNumber::One,
        }
    }

    /// Uniformly random seat; used to pick the first serving player.
    pub fn random(rng: &mut impl Rng) -> Self {
        if rng.gen_bool(0.5) {
            PlayerNumber::One
        } else {
            PlayerNumber::Two
        }
    }

    /// Horizontal serve direction toward this player's wall:
    /// player 1 defends the left wall, player 2 the right.
    pub fn serve_direction(self) -> f32 {
        match self {
            PlayerNumber::One => -1.0,
            PlayerNumber::Two => 1.0,
        }
    }
}

impl From<PlayerNumber> for u8 {
    fn from(value: PlayerNumber) -> Self {
        match value {
            PlayerNumber::One => 1,
            PlayerNumber::Two => 2,
        }
    }
}

impl TryFrom<u8> for PlayerNumber {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PlayerNumber::One),
            2 => Ok(PlayerNumber::Two),
            other => Err(format!("invalid player number: {other}")),
        }
    }
}

impl std::fmt::Display for PlayerNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Paddle state. `x` is the left edge of the rectangle; `y` is the
/// vertical center.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paddle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Current movement input in [-1, 1]; integrated by `apply_velocity`
    pub velocity: f32,
}

impl Paddle {
    pub fn new(x: f32, height: f32) -> Self {
        Self {
            x,
            y: field::HEIGHT / 2.0,
            width: paddle::WIDTH,
            height,
            velocity: 0.0,
        }
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y - self.height / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height / 2.0
    }

    /// Integrate `velocity` over `dt_ms` milliseconds. When the motion
    /// runs into a field bound the position is clamped and `velocity` is
    /// zeroed; this is the only place velocity is reset automatically.
    pub fn apply_velocity(&mut self, dt_ms: f32) {
        if self.velocity == 0.0 {
            return;
        }
        self.y += self.velocity * paddle::SPEED * dt_ms;
        if self.clamp_to_bounds() {
            self.velocity = 0.0;
        }
    }

    /// Clamp `y` into the legal band `[height/2, FIELD_HEIGHT - height/2]`.
    /// Idempotent; returns whether clamping changed the position.
    pub fn clamp_to_bounds(&mut self) -> bool {
        let min = self.height / 2.0;
        let max = field::HEIGHT - self.height / 2.0;
        let clamped = self.y.clamp(min, max);
        if clamped != self.y {
            self.y = clamped;
            true
        } else {
            false
        }
    }

    /// Authoritative position update from a validated client input.
    pub fn set_position(&mut self, y: f32) {
        self.y = y;
        self.clamp_to_bounds();
    }
}

/// Ball state. `x`/`y` are the center; speeds are units per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub speed_x: f32,
    pub speed_y: f32,
}

impl Ball {
    pub fn new() -> Self {
        Self {
            x: field::WIDTH / 2.0,
            y: field::HEIGHT / 2.0,
            radius: ball::RADIUS,
            speed_x: 0.0,
            speed_y: 0.0,
        }
    }

    /// One tick of straight-line motion.
    pub fn advance(&mut self) {
        self.x += self.speed_x;
        self.y += self.speed_y;
    }

    pub fn is_moving(&self) -> bool {
        self.speed_x != 0.0 || self.speed_y != 0.0
    }

    pub fn stop(&mut self) {
        self.speed_x = 0.0;
        self.speed_y = 0.0;
    }

    /// Re-center the ball and launch it toward `direction` (-1 left,
    /// +1 right) at scalar `speed`. A serve is perfectly horizontal with
    /// probability `HORIZONTAL_SERVE_CHANCE`, otherwise deflected by a
    /// uniform angle within +/-`SERVE_MAX_ANGLE`. Serves are exempt from
    /// the minimum vertical speed floor.
    pub fn serve(&mut self, direction: f32, speed: f32, rng: &mut impl Rng) {
        self.x = field::WIDTH / 2.0;
        self.y = field::HEIGHT / 2.0;
        if rng.gen_bool(ball::HORIZONTAL_SERVE_CHANCE) {
            self.speed_x = direction * speed;
            self.speed_y = 0.0;
        } else {
            let angle = rng.gen_range(-ball::SERVE_MAX_ANGLE..=ball::SERVE_MAX_ANGLE);
            self.speed_x = direction * speed * angle.cos();
            self.speed_y = speed * angle.sin();
        }
    }

    /// Re-center and invert both speed components. Used at game (not
    /// point) reset; the next serve overwrites the speeds anyway.
    pub fn reset_to_center(&mut self) {
        self.x = field::WIDTH / 2.0;
        self.y = field::HEIGHT / 2.0;
        self.speed_x = -self.speed_x;
        self.speed_y = -self.speed_y;
    }
}

impl Default for Ball {
    fn default() -> Self {
        Self::new()
    }
}

/// Running score for the two seats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub player1: u32,
    pub player2: u32,
}

impl Score {
    pub fn get(&self, player: PlayerNumber) -> u32 {
        match player {
            PlayerNumber::One => self.player1,
            PlayerNumber::Two => self.player2,
        }
    }

    pub fn increment(&mut self, player: PlayerNumber) {
        match player {
            PlayerNumber::One => self.player1 += 1,
            PlayerNumber::Two => self.player2 += 1,
        }
    }

    pub fn reset(&mut self) {
        self.player1 = 0;
        self.player2 = 0;
    }

    /// Player currently ahead, if any.
    pub fn leader(&self) -> Option<PlayerNumber> {
        match self.player1.cmp(&self.player2) {
            std::cmp::Ordering::Greater => Some(PlayerNumber::One),
            std::cmp::Ordering::Less => Some(PlayerNumber::Two),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Per-match settings, fixed at match creation and pushed to a joiner
/// entering an occupied match. `map` is a cosmetic label and `power_ups`
/// is carried for the client only; neither affects the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub ball_speed: f32,
    pub paddle_height: f32,
    pub win_score: u32,
    pub map: String,
    pub power_ups: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            ball_speed: ball::SPEED,
            paddle_height: paddle::HEIGHT,
            win_score: score::WIN_SCORE,
            map: "classic".to_string(),
            power_ups: false,
        }
    }
}

/// Complete simulation state for one match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongState {
    pub paddle1: Paddle,
    pub paddle2: Paddle,
    pub ball: Ball,
    pub score: Score,
    pub serving_player: PlayerNumber,
    pub game_started: bool,
    pub winner: Option<PlayerNumber>,
    pub tick: u64,
}

impl PongState {
    pub fn new(settings: &GameSettings) -> Self {
        let paddle1 = Paddle::new(paddle::MARGIN, settings.paddle_height);
        let paddle2 = Paddle::new(
            field::WIDTH - paddle::MARGIN - paddle::WIDTH,
            settings.paddle_height,
        );
        Self {
            paddle1,
            paddle2,
            ball: Ball::new(),
            score: Score::default(),
            serving_player: PlayerNumber::One,
            game_started: false,
            winner: None,
            tick: 0,
        }
    }

    pub fn paddle(&self, player: PlayerNumber) -> &Paddle {
        match player {
            PlayerNumber::One => &self.paddle1,
            PlayerNumber::Two => &self.paddle2,
        }
    }

    pub fn paddle_mut(&mut self, player: PlayerNumber) -> &mut Paddle {
        match player {
            PlayerNumber::One => &mut self.paddle1,
            PlayerNumber::Two => &mut self.paddle2,
        }
    }

    /// Serve toward `target`'s wall and record them as the serving player.
    pub fn serve_toward(&mut self, target: PlayerNumber, speed: f32, rng: &mut impl Rng) {
        self.ball.serve(target.serve_direction(), speed, rng);
        self.serving_player = target;
    }

    /// Re-arm a fresh game between the same two seats: zero the score,
    /// recenter paddles and ball, clear the winner and the started flag,
    /// and draw a fresh serving player.
    pub fn reset_for_rematch(&mut self, rng: &mut impl Rng) {
        self.score.reset();
        self.winner = None;
        self.game_started = false;
        self.paddle1.y = field::HEIGHT / 2.0;
        self.paddle2.y = field::HEIGHT / 2.0;
        self.paddle1.velocity = 0.0;
        self.paddle2.velocity = 0.0;
        self.ball.reset_to_center();
        self.ball.stop();
        self.serving_player = PlayerNumber::random(rng);
        self.tick = 0;
    }
}
