//! Per-match actor: owns the state machine and the fixed-rate tick loop.
//! Each match runs as one task fed by a command mailbox, so all state
//! mutation for a match happens on a single task with no locking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::constants::tick;
use crate::game::physics::TickEvent;
use crate::game::state::PlayerNumber;
use crate::metrics::Metrics;
use crate::net::connection::{ConnectionId, ConnectionRegistry};
use crate::net::protocol::{ClientMessage, GameStateSnapshot, ServerMessage};
use crate::session::match_state::{DisconnectOutcome, Match, MatchError, MatchPhase, RematchOutcome};
use crate::session::registry::MatchRegistry;

/// Mailbox depth per match; two players at input rate sit well below this.
const MAILBOX_DEPTH: usize = 256;

/// Commands a match actor accepts from connection tasks.
#[derive(Debug)]
pub enum MatchCommand {
    Join {
        connection_id: ConnectionId,
        reply: oneshot::Sender<Result<PlayerNumber, MatchError>>,
    },
    Message {
        connection_id: ConnectionId,
        message: ClientMessage,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Shutdown,
}

/// Cheap clonable address of a running match actor.
#[derive(Debug, Clone)]
pub struct MatchHandle {
    id: String,
    tx: mpsc::Sender<MatchCommand>,
}

impl MatchHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ask the actor for a seat. Errors from a dead actor collapse into
    /// `MatchClosed`.
    pub async fn join(&self, connection_id: ConnectionId) -> Result<PlayerNumber, MatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = MatchCommand::Join {
            connection_id,
            reply: reply_tx,
        };
        if self.tx.send(command).await.is_err() {
            return Err(MatchError::MatchClosed);
        }
        reply_rx.await.unwrap_or(Err(MatchError::MatchClosed))
    }

    /// Forward a decoded client frame.
    pub async fn message(&self, connection_id: ConnectionId, message: ClientMessage) {
        let command = MatchCommand::Message {
            connection_id,
            message,
        };
        let _ = self.tx.send(command).await;
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let _ = self.tx.send(MatchCommand::Disconnect { connection_id }).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(MatchCommand::Shutdown).await;
    }
}

/// Spawn the actor task for a match and hand back its address.
pub fn spawn_match(
    game: Match,
    registry: Arc<MatchRegistry>,
    connections: Arc<ConnectionRegistry>,
    metrics: Arc<Metrics>,
) -> MatchHandle {
    let id = game.id().to_string();
    let (tx, rx) = mpsc::channel(MAILBOX_DEPTH);
    tokio::spawn(run_match(game, rx, registry, connections, metrics));
    MatchHandle { id, tx }
}

async fn run_match(
    mut game: Match,
    mut mailbox: mpsc::Receiver<MatchCommand>,
    registry: Arc<MatchRegistry>,
    connections: Arc<ConnectionRegistry>,
    metrics: Arc<Metrics>,
) {
    let mut ticker = interval(Duration::from_millis(tick::DURATION_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Match {} running at {} Hz", game.id(), tick::RATE);

    loop {
        tokio::select! {
            command = mailbox.recv() => {
                match command {
                    Some(MatchCommand::Join { connection_id, reply }) => {
                        handle_join(&mut game, connection_id, reply, &connections, &metrics);
                    }
                    Some(MatchCommand::Message { connection_id, message }) => {
                        handle_message(&mut game, connection_id, message, &connections, &metrics);
                    }
                    Some(MatchCommand::Disconnect { connection_id }) => {
                        handle_disconnect(&mut game, connection_id, &connections, &metrics);
                    }
                    Some(MatchCommand::Shutdown) | None => {
                        debug!("Match {} told to shut down", game.id());
                        broadcast(
                            &game,
                            &connections,
                            &metrics,
                            ServerMessage::Error { message: "Server shutting down".to_string() },
                        );
                        break;
                    }
                }
                if game.phase() == MatchPhase::Closed {
                    break;
                }
            }
            _ = ticker.tick() => {
                run_tick(&mut game, &connections, &metrics);
            }
        }
    }

    registry.remove(game.id());
    metrics.record_match_closed();
    info!("Match {} closed after {:?}", game.id(), game.age());
}

fn run_tick(game: &mut Match, connections: &Arc<ConnectionRegistry>, metrics: &Arc<Metrics>) {
    if game.phase() != MatchPhase::Active {
        return;
    }

    let started = Instant::now();
    let events = game.tick();
    metrics.record_tick(started.elapsed());

    for event in &events {
        match event {
            TickEvent::PointScored { scorer, score } => {
                metrics.record_point_scored();
                info!(
                    "Match {}: player {} scores ({} - {})",
                    game.id(),
                    scorer,
                    score.player1,
                    score.player2
                );
            }
            TickEvent::GameWon { winner } => {
                metrics.record_game_completed();
                info!("Match {}: player {} wins", game.id(), winner);
            }
            TickEvent::WallBounce | TickEvent::PaddleBounce { .. } => {}
        }
    }

    broadcast_snapshot(game, connections, metrics);

    if game.state().tick % tick::STATS_LOG_INTERVAL == 0 {
        let idle_secs =
            |number| -> f32 {
                game.slot(number)
                    .map(|slot| slot.idle_for().as_secs_f32())
                    .unwrap_or_default()
            };
        info!(
            "Match {}: tick {}, score {} - {} | input idle {:.1}s / {:.1}s",
            game.id(),
            game.state().tick,
            game.state().score.player1,
            game.state().score.player2,
            idle_secs(PlayerNumber::One),
            idle_secs(PlayerNumber::Two)
        );
    }
}

fn handle_join(
    game: &mut Match,
    connection_id: ConnectionId,
    reply: oneshot::Sender<Result<PlayerNumber, MatchError>>,
    connections: &Arc<ConnectionRegistry>,
    metrics: &Arc<Metrics>,
) {
    let result = game.join(connection_id);
    let _ = reply.send(result.clone());
    let number = match result {
        Ok(number) => number,
        Err(err) => {
            debug!("Match {}: join refused for {}: {}", game.id(), connection_id, err);
            return;
        }
    };

    info!(
        "Match {}: {} seated as player {} ({} of 2)",
        game.id(),
        connection_id,
        number,
        game.player_count()
    );

    // Greeting sequence for the joiner: seat, welcome, settings (when an
    // opponent is already in), then the authoritative board.
    send_to(connections, metrics, connection_id, ServerMessage::PlayerNumber {
        player_number: number,
    });
    send_to(connections, metrics, connection_id, ServerMessage::Connected {
        message: format!("Connected to match {}", game.id()),
        game_id: game.id().to_string(),
    });
    if game.player_count() == 2 {
        send_to(connections, metrics, connection_id, ServerMessage::SettingsUpdate {
            settings: game.settings().clone(),
        });
    }
    send_to(connections, metrics, connection_id, ServerMessage::GameState {
        game_state: GameStateSnapshot::from_state(game.state()),
        player_number: Some(number),
    });

    // The seated opponent sees the (possibly reset) board too.
    if let Some(opponent_conn) = game.connection_of(number.opponent()) {
        send_to(connections, metrics, opponent_conn, ServerMessage::GameState {
            game_state: GameStateSnapshot::from_state(game.state()),
            player_number: None,
        });
    }
}

fn handle_message(
    game: &mut Match,
    connection_id: ConnectionId,
    message: ClientMessage,
    connections: &Arc<ConnectionRegistry>,
    metrics: &Arc<Metrics>,
) {
    match message {
        ClientMessage::StartGame => match game.start_game(connection_id) {
            Ok(()) => {
                info!(
                    "Match {}: game on, player {} serves",
                    game.id(),
                    game.state().serving_player
                );
                broadcast_snapshot(game, connections, metrics);
            }
            Err(err) => {
                debug!("Match {}: start refused for {}: {}", game.id(), connection_id, err);
                send_to(connections, metrics, connection_id, ServerMessage::Error {
                    message: err.to_string(),
                });
            }
        },
        ClientMessage::MovePaddle {
            player_number,
            paddle_position,
            input_sequence,
        } => {
            match game.move_paddle(connection_id, player_number, paddle_position, input_sequence) {
                Ok(()) => {
                    // Echo authoritatively; outside the active phase this
                    // is the only snapshot clients get.
                    broadcast_snapshot(game, connections, metrics);
                }
                Err(rejection) => {
                    metrics.record_input_rejected();
                    if rejection.warrants_reply() {
                        warn!("Match {}: {} ({})", game.id(), rejection, connection_id);
                        send_to(connections, metrics, connection_id, ServerMessage::Error {
                            message: rejection.to_string(),
                        });
                    } else {
                        debug!(
                            "Match {}: dropped input from {}: {}",
                            game.id(),
                            connection_id,
                            rejection
                        );
                    }
                }
            }
        }
        ClientMessage::RematchRequest => match game.request_rematch(connection_id) {
            Ok(RematchOutcome::Recorded { by }) => {
                info!("Match {}: player {} wants a rematch", game.id(), by);
                if let Some(opponent_conn) = game.connection_of(by.opponent()) {
                    send_to(connections, metrics, opponent_conn, ServerMessage::RematchRequested {
                        player: by,
                    });
                }
            }
            Ok(RematchOutcome::Restarted) => {
                metrics.record_rematch();
                info!("Match {}: rematch agreed, back in the lobby", game.id());
                broadcast(game, connections, metrics, ServerMessage::Rematch);
                broadcast_snapshot(game, connections, metrics);
            }
            Ok(RematchOutcome::Duplicate) => {}
            Err(err) => {
                debug!(
                    "Match {}: rematch refused for {}: {}",
                    game.id(),
                    connection_id,
                    err
                );
                send_to(connections, metrics, connection_id, ServerMessage::Error {
                    message: err.to_string(),
                });
            }
        },
        // Heartbeat frames are answered by the connection task; one that
        // leaks through here is harmless.
        ClientMessage::Ping { .. } | ClientMessage::Pong { .. } => {
            debug!("Match {}: stray heartbeat frame from {}", game.id(), connection_id);
        }
    }
}

fn handle_disconnect(
    game: &mut Match,
    connection_id: ConnectionId,
    connections: &Arc<ConnectionRegistry>,
    metrics: &Arc<Metrics>,
) {
    let seat_held = game
        .slot_of(connection_id)
        .map(|slot| slot.joined_at.elapsed())
        .unwrap_or_default();

    match game.handle_disconnect(connection_id) {
        DisconnectOutcome::NotSeated => {}
        DisconnectOutcome::Forfeit { winner } => {
            metrics.record_forfeit();
            info!("Match {}: player {} wins by forfeit", game.id(), winner);
            broadcast(game, connections, metrics, ServerMessage::OpponentDisconnected {
                winner: Some(winner),
            });
            broadcast_snapshot(game, connections, metrics);
        }
        DisconnectOutcome::OpponentLeft { remaining } => {
            info!(
                "Match {}: player {} left after {:?}, player {} keeps the board",
                game.id(),
                remaining.opponent(),
                seat_held,
                remaining
            );
            broadcast(game, connections, metrics, ServerMessage::OpponentDisconnected {
                winner: None,
            });
        }
        DisconnectOutcome::Closed => {
            info!(
                "Match {}: last player left after holding a seat for {:?}",
                game.id(),
                seat_held
            );
        }
    }
}

fn broadcast_snapshot(game: &Match, connections: &Arc<ConnectionRegistry>, metrics: &Arc<Metrics>) {
    let message = ServerMessage::GameState {
        game_state: GameStateSnapshot::from_state(game.state()),
        player_number: None,
    };
    broadcast(game, connections, metrics, message);
}

fn broadcast(
    game: &Match,
    connections: &Arc<ConnectionRegistry>,
    metrics: &Arc<Metrics>,
    message: ServerMessage,
) {
    for connection_id in game.connection_ids() {
        send_to(connections, metrics, connection_id, message.clone());
    }
}

/// Resolve and enqueue, keeping the sent/dropped counters honest. A
/// connection missing from the registry is mid-teardown and skipped.
fn send_to(
    connections: &Arc<ConnectionRegistry>,
    metrics: &Arc<Metrics>,
    connection_id: ConnectionId,
    message: ServerMessage,
) {
    if let Some(handle) = connections.resolve(connection_id) {
        if handle.send(message) {
            metrics.record_message_sent();
        } else {
            metrics.record_message_dropped();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::GameSettings;
    use crate::net::connection::ConnectionHandle;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::net::SocketAddr;

    fn test_addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    struct Harness {
        registry: Arc<MatchRegistry>,
        connections: Arc<ConnectionRegistry>,
        metrics: Arc<Metrics>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: Arc::new(MatchRegistry::new(GameSettings::default(), 8)),
                connections: Arc::new(ConnectionRegistry::new()),
                metrics: Arc::new(Metrics::new()),
            }
        }

        fn spawn(&self, id: &str) -> MatchHandle {
            let game = Match::new(id, GameSettings::default());
            spawn_match(
                game,
                Arc::clone(&self.registry),
                Arc::clone(&self.connections),
                Arc::clone(&self.metrics),
            )
        }

        /// Seeded spawn that also reports which seat serves first, so a
        /// test can route `startGame` through the right connection.
        fn spawn_seeded(&self, id: &str, seed: u64) -> (MatchHandle, PlayerNumber) {
            let game = Match::with_rng(id, GameSettings::default(), StdRng::seed_from_u64(seed));
            let server = game.state().serving_player;
            let handle = spawn_match(
                game,
                Arc::clone(&self.registry),
                Arc::clone(&self.connections),
                Arc::clone(&self.metrics),
            );
            (handle, server)
        }

        fn connect(&self, port: u16) -> (ConnectionHandle, mpsc::Receiver<ServerMessage>) {
            let (tx, rx) = mpsc::channel(64);
            (self.connections.register(test_addr(port), tx), rx)
        }
    }

    async fn recv_frame(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("outbound channel closed")
    }

    async fn recv_until(
        rx: &mut mpsc::Receiver<ServerMessage>,
        mut pred: impl FnMut(&ServerMessage) -> bool,
    ) -> ServerMessage {
        for _ in 0..500 {
            let frame = recv_frame(rx).await;
            if pred(&frame) {
                return frame;
            }
        }
        panic!("expected frame not seen within 500 messages");
    }

    #[tokio::test]
    async fn test_first_join_greeting_sequence() {
        let h = Harness::new();
        let m = h.spawn("m-greet");
        let (conn, mut rx) = h.connect(40001);

        let number = m.join(conn.id).await.unwrap();
        assert_eq!(number, PlayerNumber::One);

        assert_eq!(
            recv_frame(&mut rx).await,
            ServerMessage::PlayerNumber {
                player_number: PlayerNumber::One
            }
        );
        assert!(matches!(
            recv_frame(&mut rx).await,
            ServerMessage::Connected { game_id, .. } if game_id == "m-greet"
        ));
        // no opponent yet, so no settings push; board comes next
        match recv_frame(&mut rx).await {
            ServerMessage::GameState {
                game_state,
                player_number,
            } => {
                assert_eq!(player_number, Some(PlayerNumber::One));
                assert!(!game_state.game_started);
            }
            other => panic!("expected gameState, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_join_gets_settings_and_notifies_first() {
        let h = Harness::new();
        let m = h.spawn("m-two");
        let (c1, mut rx1) = h.connect(40002);
        let (c2, mut rx2) = h.connect(40003);

        m.join(c1.id).await.unwrap();
        assert_eq!(m.join(c2.id).await, Ok(PlayerNumber::Two));

        // joiner sequence includes the settings push
        assert!(matches!(
            recv_frame(&mut rx2).await,
            ServerMessage::PlayerNumber {
                player_number: PlayerNumber::Two
            }
        ));
        assert!(matches!(recv_frame(&mut rx2).await, ServerMessage::Connected { .. }));
        assert!(matches!(
            recv_frame(&mut rx2).await,
            ServerMessage::SettingsUpdate { .. }
        ));
        assert!(matches!(recv_frame(&mut rx2).await, ServerMessage::GameState { .. }));

        // the first player sees a fresh broadcast board
        recv_until(&mut rx1, |f| {
            matches!(
                f,
                ServerMessage::GameState {
                    player_number: None,
                    ..
                }
            )
        })
        .await;
    }

    #[tokio::test]
    async fn test_third_join_is_refused() {
        let h = Harness::new();
        let m = h.spawn("m-full");
        let (c1, _rx1) = h.connect(40004);
        let (c2, _rx2) = h.connect(40005);
        let (c3, mut rx3) = h.connect(40006);

        m.join(c1.id).await.unwrap();
        m.join(c2.id).await.unwrap();
        assert_eq!(m.join(c3.id).await, Err(MatchError::MatchFull));

        // the refused connection gets no greeting
        assert!(tokio::time::timeout(Duration::from_millis(100), rx3.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_start_game_broadcasts_running_board() {
        let h = Harness::new();
        let (m, server) = h.spawn_seeded("m-start", 11);
        let (c1, mut rx1) = h.connect(40007);
        let (c2, mut rx2) = h.connect(40008);
        m.join(c1.id).await.unwrap();
        m.join(c2.id).await.unwrap();

        let server_conn = match server {
            PlayerNumber::One => c1.id,
            PlayerNumber::Two => c2.id,
        };
        m.message(server_conn, ClientMessage::StartGame).await;

        for rx in [&mut rx1, &mut rx2] {
            let frame = recv_until(rx, |f| {
                matches!(
                    f,
                    ServerMessage::GameState { game_state, .. } if game_state.game_started
                )
            })
            .await;
            if let ServerMessage::GameState { game_state, .. } = frame {
                assert!(game_state.winner.is_none());
            }
        }
    }

    #[tokio::test]
    async fn test_start_refusal_replies_with_error() {
        let h = Harness::new();
        let m = h.spawn("m-lone");
        let (c1, mut rx1) = h.connect(40009);
        m.join(c1.id).await.unwrap();

        m.message(c1.id, ClientMessage::StartGame).await;

        let frame = recv_until(&mut rx1, |f| matches!(f, ServerMessage::Error { .. })).await;
        if let ServerMessage::Error { message } = frame {
            assert!(message.contains("opponent"), "unexpected text: {message}");
        }
    }

    #[tokio::test]
    async fn test_non_serving_start_replies_with_error() {
        let h = Harness::new();
        let (m, server) = h.spawn_seeded("m-serve-gate", 13);
        let (c1, mut rx1) = h.connect(40019);
        let (c2, mut rx2) = h.connect(40020);
        m.join(c1.id).await.unwrap();
        m.join(c2.id).await.unwrap();

        let (intruder, intruder_rx) = match server {
            PlayerNumber::One => (c2.id, &mut rx2),
            PlayerNumber::Two => (c1.id, &mut rx1),
        };
        m.message(intruder, ClientMessage::StartGame).await;

        let frame =
            recv_until(&mut *intruder_rx, |f| matches!(f, ServerMessage::Error { .. })).await;
        assert_eq!(
            frame,
            ServerMessage::Error {
                message: "Only the serving player can start the round".to_string()
            }
        );

        // the board never started
        m.message(
            intruder,
            ClientMessage::MovePaddle {
                player_number: u8::from(server.opponent()),
                paddle_position: 300.0,
                input_sequence: 1,
            },
        )
        .await;
        let frame = recv_until(&mut *intruder_rx, |f| {
            matches!(f, ServerMessage::GameState { .. })
        })
        .await;
        if let ServerMessage::GameState { game_state, .. } = frame {
            assert!(!game_state.game_started);
        }
    }

    #[tokio::test]
    async fn test_wrong_seat_claim_replies_with_error() {
        let h = Harness::new();
        let m = h.spawn("m-auth");
        let (c1, mut rx1) = h.connect(40010);
        let (c2, _rx2) = h.connect(40011);
        m.join(c1.id).await.unwrap();
        m.join(c2.id).await.unwrap();

        m.message(
            c1.id,
            ClientMessage::MovePaddle {
                player_number: 2,
                paddle_position: 250.0,
                input_sequence: 1,
            },
        )
        .await;

        recv_until(&mut rx1, |f| matches!(f, ServerMessage::Error { .. })).await;
    }

    #[tokio::test]
    async fn test_lobby_move_is_echoed_to_both_players() {
        let h = Harness::new();
        let m = h.spawn("m-echo");
        let (c1, _rx1) = h.connect(40012);
        let (c2, mut rx2) = h.connect(40013);
        m.join(c1.id).await.unwrap();
        m.join(c2.id).await.unwrap();

        m.message(
            c1.id,
            ClientMessage::MovePaddle {
                player_number: 1,
                paddle_position: 123.0,
                input_sequence: 1,
            },
        )
        .await;

        recv_until(&mut rx2, |f| {
            matches!(
                f,
                ServerMessage::GameState { game_state, .. }
                    if game_state.paddles.player1.y == 123.0
            )
        })
        .await;
    }

    #[tokio::test]
    async fn test_disconnect_mid_game_broadcasts_forfeit() {
        let h = Harness::new();
        let (m, server) = h.spawn_seeded("m-forfeit", 17);
        let (c1, _rx1) = h.connect(40014);
        let (c2, mut rx2) = h.connect(40015);
        m.join(c1.id).await.unwrap();
        m.join(c2.id).await.unwrap();
        let server_conn = match server {
            PlayerNumber::One => c1.id,
            PlayerNumber::Two => c2.id,
        };
        m.message(server_conn, ClientMessage::StartGame).await;

        m.disconnect(c1.id).await;

        let frame = recv_until(&mut rx2, |f| {
            matches!(f, ServerMessage::OpponentDisconnected { .. })
        })
        .await;
        assert_eq!(
            frame,
            ServerMessage::OpponentDisconnected {
                winner: Some(PlayerNumber::Two)
            }
        );
    }

    #[tokio::test]
    async fn test_rematch_request_notifies_opponent_only() {
        let h = Harness::new();
        let m = h.spawn("m-rematch");
        let (c1, _rx1) = h.connect(40016);
        let (c2, mut rx2) = h.connect(40017);
        m.join(c1.id).await.unwrap();
        m.join(c2.id).await.unwrap();

        // outside the rematch window the request is refused
        m.message(c1.id, ClientMessage::RematchRequest).await;
        recv_until(&mut rx2, |f| matches!(f, ServerMessage::GameState { .. })).await;

        // window never opened, so no rematchRequested ever reaches c2
        m.message(c1.id, ClientMessage::Ping { timestamp: 1 }).await;
        let saw_request = tokio::time::timeout(Duration::from_millis(100), async {
            recv_until(&mut rx2, |f| {
                matches!(f, ServerMessage::RematchRequested { .. })
            })
            .await
        })
        .await;
        assert!(saw_request.is_err());
    }

    #[tokio::test]
    async fn test_actor_exits_when_last_player_leaves() {
        let h = Harness::new();
        let m = h.spawn("m-close");
        let (c1, _rx1) = h.connect(40018);
        m.join(c1.id).await.unwrap();

        m.disconnect(c1.id).await;

        // the mailbox closes once the actor is gone
        let mut joined = Err(MatchError::MatchClosed);
        for _ in 0..50 {
            joined = m.join(c1.id).await;
            if joined == Err(MatchError::MatchClosed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(joined, Err(MatchError::MatchClosed));
    }
}
