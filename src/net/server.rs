//! WebSocket endpoint. Accepts connections, routes each one to a match
//! by request path, and runs the per-connection read loop, writer task
//! and application-level heartbeat.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::game::constants::net;
use crate::metrics::Metrics;
use crate::net::connection::ConnectionRegistry;
use crate::net::protocol::{self, ClientMessage, ServerMessage};
use crate::session::registry::MatchRegistry;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// The WebSocket game server.
pub struct PongServer {
    config: ServerConfig,
    matches: Arc<MatchRegistry>,
    connections: Arc<ConnectionRegistry>,
    metrics: Arc<Metrics>,
}

impl PongServer {
    pub fn new(
        config: ServerConfig,
        matches: Arc<MatchRegistry>,
        connections: Arc<ConnectionRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            matches,
            connections,
            metrics,
        }
    }

    /// Bind the configured address and serve until the task is dropped.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.game_addr()).await?;
        info!("Pong server listening on {}", self.config.game_addr());
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let config = self.config.clone();
                    let matches = Arc::clone(&self.matches);
                    let connections = Arc::clone(&self.connections);
                    let metrics = Arc::clone(&self.metrics);
                    tokio::spawn(async move {
                        handle_connection(stream, addr, config, matches, connections, metrics)
                            .await;
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    config: ServerConfig,
    matches: Arc<MatchRegistry>,
    connections: Arc<ConnectionRegistry>,
    metrics: Arc<Metrics>,
) {
    // the request path is only visible during the handshake
    let mut request_path = String::new();
    let ws_stream = match accept_hdr_async(stream, |req: &Request, response: Response| {
        request_path = req.uri().path().to_string();
        Ok(response)
    })
    .await
    {
        Ok(ws) => ws,
        Err(e) => {
            debug!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let match_key = parse_match_key(&request_path);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<ServerMessage>(net::OUTBOUND_QUEUE_DEPTH);
    let handle = connections.register(addr, outbound_tx);
    metrics.record_connection_opened();
    info!("{} connected from {} ({})", handle.id, addr, request_path);

    // Writer task: drains the outbound queue onto the socket. It exits on
    // its own once every sender is gone, flushing whatever is queued.
    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match protocol::encode(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode frame: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let match_handle = match matches.join_or_create(match_key.as_deref(), &connections, &metrics) {
        Ok(match_handle) => match_handle,
        Err(e) => {
            warn!("{} refused: {}", handle.id, e);
            handle.send(ServerMessage::Error {
                message: e.to_string(),
            });
            connections.unregister(handle.id);
            metrics.record_connection_closed();
            return;
        }
    };

    match match_handle.join(handle.id).await {
        Ok(number) => {
            debug!(
                "{} is player {} in match {}",
                handle.id,
                number,
                match_handle.id()
            );
        }
        Err(e) => {
            info!(
                "{} turned away from match {}: {}",
                handle.id,
                match_handle.id(),
                e
            );
            handle.send(ServerMessage::Error {
                message: e.to_string(),
            });
            connections.unregister(handle.id);
            metrics.record_connection_closed();
            return;
        }
    }

    let mut heartbeat = interval(Duration::from_secs(config.heartbeat_interval_secs));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first interval tick completes immediately; swallow it so the
    // first probe goes out one full interval after connect
    heartbeat.tick().await;
    let mut missed_probes: u32 = 0;

    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        metrics.record_message_received();
                        match protocol::decode(text.as_str()) {
                            Ok(ClientMessage::Ping { timestamp }) => {
                                missed_probes = 0;
                                handle.send(ServerMessage::Pong { timestamp });
                            }
                            Ok(ClientMessage::Pong { .. }) => {
                                missed_probes = 0;
                            }
                            Ok(message) => {
                                match_handle.message(handle.id, message).await;
                            }
                            Err(e) => {
                                debug!("{} sent an undecodable frame: {}", handle.id, e);
                                handle.send(ServerMessage::Error {
                                    message: "Invalid message format".to_string(),
                                });
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("{} sent a binary frame; protocol is text only", handle.id);
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // transport-level pings are answered by tungstenite;
                        // either direction proves the peer is alive
                        missed_probes = 0;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("{} closed the stream", handle.id);
                        break;
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        debug!("{} socket error: {}", handle.id, e);
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if missed_probes >= config.heartbeat_max_missed {
                    info!("{} unresponsive after {} probes, dropping", handle.id, missed_probes);
                    break;
                }
                missed_probes += 1;
                handle.send(ServerMessage::Ping { timestamp: unix_millis() });
            }
        }
    }

    // exactly one disconnect notification per connection
    match_handle.disconnect(handle.id).await;
    connections.unregister(handle.id);
    metrics.record_connection_closed();
    info!(
        "{} disconnected after {:?}",
        handle.id,
        handle.connected_at.elapsed()
    );
}

/// Extract the match key from a request path. `/match/{key}` addresses a
/// shared match; anything else asks for a fresh one. Keys longer than 64
/// bytes are ignored rather than stored.
fn parse_match_key(path: &str) -> Option<String> {
    let trimmed = path.trim_matches('/');
    match trimmed.strip_prefix("match/") {
        Some(key) if !key.is_empty() && key.len() <= 64 => Some(key.trim_matches('/').to_string()),
        _ => None,
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
