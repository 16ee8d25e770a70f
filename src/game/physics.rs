//! Per-tick simulation step: paddle integration, ball motion, wall and
//! paddle bounces, scoring and serve rotation.
//!
//! All randomness (serve angles, bounce jitter) flows through the caller's
//! RNG so a seeded run is fully deterministic.

use rand::Rng;

use crate::game::constants::{ball as ball_consts, field, tick};
use crate::game::state::{Ball, GameSettings, PlayerNumber, PongState, Score};

/// What happened during one simulation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickEvent {
    WallBounce,
    PaddleBounce { player: PlayerNumber },
    PointScored { scorer: PlayerNumber, score: Score },
    GameWon { winner: PlayerNumber },
}

/// Advance the simulation by one tick. The session layer only calls this
/// while the match is active.
pub fn step(state: &mut PongState, settings: &GameSettings, rng: &mut impl Rng) -> Vec<TickEvent> {
    let mut events = Vec::new();

    state.paddle1.apply_velocity(tick::DT_MS);
    state.paddle2.apply_velocity(tick::DT_MS);

    state.ball.advance();

    if bounce_off_walls(&mut state.ball, rng) {
        events.push(TickEvent::WallBounce);
    }

    if let Some(player) = bounce_off_paddle(state, rng) {
        events.push(TickEvent::PaddleBounce { player });
    }

    if let Some(scorer) = crossed_goal_line(&state.ball) {
        state.score.increment(scorer);
        events.push(TickEvent::PointScored {
            scorer,
            score: state.score,
        });

        if state.score.get(scorer) >= settings.win_score {
            state.winner = Some(scorer);
            state.game_started = false;
            state.ball.stop();
            events.push(TickEvent::GameWon { winner: scorer });
        } else {
            // The player scored against serves next, toward their own wall.
            state.serve_toward(scorer.opponent(), settings.ball_speed, rng);
        }
    }

    state.tick += 1;
    events
}

/// Top/bottom wall reflection: clamp the center back inside, invert
/// `speed_y`, jitter, then re-apply the vertical floor.
fn bounce_off_walls(ball: &mut Ball, rng: &mut impl Rng) -> bool {
    let bounced = if ball.y - ball.radius <= 0.0 {
        ball.y = ball.radius;
        ball.speed_y = -ball.speed_y;
        true
    } else if ball.y + ball.radius >= field::HEIGHT {
        ball.y = field::HEIGHT - ball.radius;
        ball.speed_y = -ball.speed_y;
        true
    } else {
        false
    };

    if bounced {
        jitter_vertical(ball, rng);
    }
    bounced
}

/// Circle-vs-rect test against the paddle the ball is traveling toward.
/// On a hit the scalar speed is preserved and redistributed by the bounce
/// angle, and the ball is pushed clear of the paddle face so the same
/// paddle cannot connect again next tick.
fn bounce_off_paddle(state: &mut PongState, rng: &mut impl Rng) -> Option<PlayerNumber> {
    let defender = if state.ball.speed_x < 0.0 {
        PlayerNumber::One
    } else if state.ball.speed_x > 0.0 {
        PlayerNumber::Two
    } else {
        return None;
    };

    let ball = &mut state.ball;
    let paddle = match defender {
        PlayerNumber::One => &state.paddle1,
        PlayerNumber::Two => &state.paddle2,
    };

    let closest_x = ball.x.clamp(paddle.left(), paddle.right());
    let closest_y = ball.y.clamp(paddle.top(), paddle.bottom());
    let dx = ball.x - closest_x;
    let dy = ball.y - closest_y;
    if dx * dx + dy * dy > ball.radius * ball.radius {
        return None;
    }

    // -1 at the paddle's top edge, 0 dead center, +1 at the bottom edge
    let hit_position = ((ball.y - paddle.y) / (paddle.height / 2.0)).clamp(-1.0, 1.0);
    let angle = hit_position * ball_consts::MAX_BOUNCE_ANGLE;
    let speed = (ball.speed_x * ball.speed_x + ball.speed_y * ball.speed_y).sqrt();
    let outgoing = -ball.speed_x.signum();

    ball.speed_x = outgoing * speed * angle.cos();
    ball.speed_y = speed * angle.sin();
    ball.x = match defender {
        PlayerNumber::One => paddle.right() + ball.radius,
        PlayerNumber::Two => paddle.left() - ball.radius,
    };

    jitter_vertical(ball, rng);
    Some(defender)
}

/// Scoring uses the ball center: past the left wall player 2 scores,
/// past the right wall player 1 scores.
fn crossed_goal_line(ball: &Ball) -> Option<PlayerNumber> {
    if ball.x <= 0.0 {
        Some(PlayerNumber::Two)
    } else if ball.x >= field::WIDTH {
        Some(PlayerNumber::One)
    } else {
        None
    }
}

fn jitter_vertical(ball: &mut Ball, rng: &mut impl Rng) {
    ball.speed_y += rng.gen_range(-ball_consts::BOUNCE_JITTER..=ball_consts::BOUNCE_JITTER);
    enforce_vertical_floor(ball);
}

/// Sign-preserving floor on |speed_y|, applied after every bounce jitter
/// so a rally can never flatten into a horizontal loop.
fn enforce_vertical_floor(ball: &mut Ball) {
    if ball.speed_y.abs() < ball_consts::MIN_VERTICAL_SPEED {
        let sign = if ball.speed_y < 0.0 { -1.0 } else { 1.0 };
        ball.speed_y = sign * ball_consts::MIN_VERTICAL_SPEED;
    }
}
