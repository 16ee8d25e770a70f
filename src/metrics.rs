//! Prometheus-compatible metrics endpoint
//!
//! Exposes match, connection and tick-timing counters in Prometheus
//! format. Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Metrics registry for the game server
#[derive(Debug)]
pub struct Metrics {
    // Match lifecycle (monotonic; the active gauge is derived)
    pub matches_created: AtomicU64,
    pub matches_closed: AtomicU64,

    // Connection lifecycle
    pub connections_opened: AtomicU64,
    pub connections_closed: AtomicU64,

    // Traffic
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub inputs_rejected: AtomicU64,

    // Game outcomes
    pub points_scored: AtomicU64,
    pub games_completed: AtomicU64,
    pub forfeits: AtomicU64,
    pub rematches: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            matches_created: AtomicU64::new(0),
            matches_closed: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            inputs_rejected: AtomicU64::new(0),
            points_scored: AtomicU64::new(0),
            games_completed: AtomicU64::new(0),
            forfeits: AtomicU64::new(0),
            rematches: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(1000)),
        }
    }

    pub fn record_match_created(&self) {
        self.matches_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match_closed(&self) {
        self.matches_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_input_rejected(&self) {
        self.inputs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_point_scored(&self) {
        self.points_scored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_game_completed(&self) {
        self.games_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forfeit(&self) {
        self.forfeits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rematch(&self) {
        self.rematches.fetch_add(1, Ordering::Relaxed);
    }

    /// Matches currently running. Saturates so a closed-without-created
    /// pair (possible in tests) cannot wrap.
    pub fn active_matches(&self) -> u64 {
        self.matches_created
            .load(Ordering::Relaxed)
            .saturating_sub(self.matches_closed.load(Ordering::Relaxed))
    }

    /// Connections currently open.
    pub fn active_connections(&self) -> u64 {
        self.connections_opened
            .load(Ordering::Relaxed)
            .saturating_sub(self.connections_closed.load(Ordering::Relaxed))
    }

    /// Record a tick time and update percentiles
    pub fn record_tick(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);

        // Keep last 1000 samples
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us
                .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us
                .store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Match metrics
        metric!("pong_duel_matches_active", "Matches currently running", "gauge",
            self.active_matches());
        metric!("pong_duel_matches_created_total", "Total matches created", "counter",
            self.matches_created.load(Ordering::Relaxed));
        metric!("pong_duel_matches_closed_total", "Total matches closed", "counter",
            self.matches_closed.load(Ordering::Relaxed));

        // Connection metrics
        metric!("pong_duel_connections_active", "Active WebSocket connections", "gauge",
            self.active_connections());
        metric!("pong_duel_connections_opened_total", "Total connections accepted", "counter",
            self.connections_opened.load(Ordering::Relaxed));
        metric!("pong_duel_connections_closed_total", "Total connections closed", "counter",
            self.connections_closed.load(Ordering::Relaxed));

        // Traffic metrics
        metric!("pong_duel_messages_sent_total", "Total frames queued to clients", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("pong_duel_messages_received_total", "Total frames received from clients", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("pong_duel_messages_dropped_total", "Frames dropped on slow connections", "counter",
            self.messages_dropped.load(Ordering::Relaxed));
        metric!("pong_duel_inputs_rejected_total", "Paddle inputs rejected by validation", "counter",
            self.inputs_rejected.load(Ordering::Relaxed));

        // Game outcome metrics
        metric!("pong_duel_points_scored_total", "Total points scored across matches", "counter",
            self.points_scored.load(Ordering::Relaxed));
        metric!("pong_duel_games_completed_total", "Games finished by reaching the win score", "counter",
            self.games_completed.load(Ordering::Relaxed));
        metric!("pong_duel_forfeits_total", "Games decided by disconnect", "counter",
            self.forfeits.load(Ordering::Relaxed));
        metric!("pong_duel_rematches_total", "Completed rematch handshakes", "counter",
            self.rematches.load(Ordering::Relaxed));

        // Performance metrics
        metric!("pong_duel_tick_time_microseconds", "Most recent tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("pong_duel_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("pong_duel_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("pong_duel_tick_time_max_microseconds", "Maximum tick time in the window", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("pong_duel_tick_count", "Total simulation ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        metric!("pong_duel_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics (alternative for direct API access)
    pub fn to_json(&self) -> String {
        format!(r#"{{
  "matches": {{
    "active": {},
    "created_total": {},
    "closed_total": {}
  }},
  "connections": {{
    "active": {},
    "opened_total": {},
    "closed_total": {}
  }},
  "traffic": {{
    "messages_sent": {},
    "messages_received": {},
    "messages_dropped": {},
    "inputs_rejected": {}
  }},
  "games": {{
    "points_scored": {},
    "completed": {},
    "forfeits": {},
    "rematches": {}
  }},
  "performance": {{
    "tick_time_us": {},
    "tick_time_p95_us": {},
    "tick_time_p99_us": {},
    "tick_time_max_us": {},
    "tick_count": {}
  }},
  "uptime_seconds": {}
}}"#,
            self.active_matches(),
            self.matches_created.load(Ordering::Relaxed),
            self.matches_closed.load(Ordering::Relaxed),
            self.active_connections(),
            self.connections_opened.load(Ordering::Relaxed),
            self.connections_closed.load(Ordering::Relaxed),
            self.messages_sent.load(Ordering::Relaxed),
            self.messages_received.load(Ordering::Relaxed),
            self.messages_dropped.load(Ordering::Relaxed),
            self.inputs_rejected.load(Ordering::Relaxed),
            self.points_scored.load(Ordering::Relaxed),
            self.games_completed.load(Ordering::Relaxed),
            self.forfeits.load(Ordering::Relaxed),
            self.rematches.load(Ordering::Relaxed),
            self.tick_time_us.load(Ordering::Relaxed),
            self.tick_time_p95_us.load(Ordering::Relaxed),
            self.tick_time_p99_us.load(Ordering::Relaxed),
            self.tick_time_max_us.load(Ordering::Relaxed),
            self.tick_count.load(Ordering::Relaxed),
            self.uptime_seconds(),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    let response = if request.starts_with("GET /metrics/json")
                        || request.starts_with("GET /json")
                    {
                        let body = metrics.to_json();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /metrics") {
                        let body = metrics.to_prometheus();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /health") || request.starts_with("GET /") {
                        let body = "OK";
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.active_matches(), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_active_gauges_derive_from_counters() {
        let metrics = Metrics::new();
        metrics.record_match_created();
        metrics.record_match_created();
        metrics.record_match_closed();
        assert_eq!(metrics.active_matches(), 1);

        // a stray close cannot wrap the gauge
        metrics.record_match_closed();
        metrics.record_match_closed();
        assert_eq!(metrics.active_matches(), 0);
    }

    #[test]
    fn test_record_tick_updates_percentiles() {
        let metrics = Metrics::new();

        for i in 0..100 {
            metrics.record_tick(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) > 0);
        assert!(
            metrics.tick_time_p99_us.load(Ordering::Relaxed)
                >= metrics.tick_time_p95_us.load(Ordering::Relaxed)
        );
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_match_created();
        metrics.record_point_scored();
        metrics.record_point_scored();

        let output = metrics.to_prometheus();

        assert!(output.contains("pong_duel_matches_active 1"));
        assert!(output.contains("pong_duel_points_scored_total 2"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.record_connection_opened();
        metrics.record_forfeit();

        let output = metrics.to_json();

        assert!(output.contains("\"active\": 1"));
        assert!(output.contains("\"forfeits\": 1"));
        assert!(output.contains("\"performance\":"));
    }
}
