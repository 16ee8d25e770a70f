//! Tick-path benchmarks for the Pong duel server
//!
//! Measures the per-match simulation cost and how it scales across many
//! concurrent matches ticking in the same process.
//!
//! Run with: cargo bench --bench match_tick

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pong_duel_server::game::physics;
use pong_duel_server::game::state::{GameSettings, PlayerNumber, PongState};
use pong_duel_server::net::connection::ConnectionId;
use pong_duel_server::net::protocol::{self, GameStateSnapshot, ServerMessage};
use pong_duel_server::session::match_state::Match;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Settings that keep a benchmark board rallying forever: points still
/// score and re-serve, but the game never finishes.
fn endless_settings() -> GameSettings {
    GameSettings {
        win_score: u32::MAX,
        ..GameSettings::default()
    }
}

/// Build a running state with the ball already served so every step
/// exercises movement, wall checks, and paddle collision tests.
fn running_state(seed: u64) -> (PongState, GameSettings, StdRng) {
    let settings = endless_settings();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = PongState::new(&settings);
    state.game_started = true;
    state.serve_toward(PlayerNumber::Two, settings.ball_speed, &mut rng);
    (state, settings, rng)
}

/// Build a match in the Active phase with both seats filled.
fn active_match(seed: u64) -> Match {
    let mut game = Match::with_rng("bench", endless_settings(), StdRng::seed_from_u64(seed));
    game.join(ConnectionId::new(1)).unwrap();
    game.join(ConnectionId::new(2)).unwrap();
    let server = match game.state().serving_player {
        PlayerNumber::One => ConnectionId::new(1),
        PlayerNumber::Two => ConnectionId::new(2),
    };
    game.start_game(server).unwrap();
    game
}

/// Benchmark a single physics step over a live board
fn bench_physics_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("physics_step");
    group.sample_size(100);

    let (mut state, settings, mut rng) = running_state(42);

    group.bench_function("serve_in_flight", |b| {
        b.iter(|| {
            black_box(physics::step(&mut state, &settings, &mut rng));
        })
    });
    group.finish();
}

/// Benchmark the full match tick (physics plus phase bookkeeping)
fn bench_match_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_tick");
    group.sample_size(100);

    let mut game = active_match(7);

    group.bench_function("active", |b| {
        b.iter(|| {
            black_box(game.tick());
        })
    });
    group.finish();
}

/// Benchmark ticking many concurrent matches, the server's steady-state load
fn bench_concurrent_matches(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_matches");
    group.sample_size(50);

    for count in [10, 50, 100, 500] {
        let mut matches: Vec<Match> = (0..count).map(|i| active_match(i as u64)).collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("tick_all", count), &count, |b, _| {
            b.iter(|| {
                for game in matches.iter_mut() {
                    black_box(game.tick());
                }
            })
        });
    }
    group.finish();
}

/// Benchmark snapshot encoding, paid once per client per tick
fn bench_snapshot_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_encode");
    group.sample_size(100);

    let (state, _, _) = running_state(99);
    let message = ServerMessage::GameState {
        game_state: GameStateSnapshot::from_state(&state),
        player_number: None,
    };

    group.bench_function("game_state", |b| {
        b.iter(|| {
            black_box(protocol::encode(&message)).ok();
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_physics_step,
    bench_match_tick,
    bench_concurrent_matches,
    bench_snapshot_encode,
);

criterion_main!(benches);
