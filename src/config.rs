use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::game::constants::{ball, field, net, paddle, score};
use crate::game::state::GameSettings;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the game and metrics listeners to
    pub bind_address: IpAddr,
    /// Port for the WebSocket endpoint
    pub port: u16,
    /// Port for the metrics/health endpoint
    pub metrics_port: u16,
    /// Maximum number of concurrent matches
    pub max_matches: usize,
    /// Seconds between server-initiated heartbeat probes
    pub heartbeat_interval_secs: u64,
    /// Probes a client may leave unanswered before it is dropped
    pub heartbeat_max_missed: u32,
    /// Scalar ball speed in units per tick for new matches
    pub ball_speed: f32,
    /// Paddle height in units for new matches
    pub paddle_height: f32,
    /// Points needed to win a game
    pub win_score: u32,
    /// Cosmetic map label pushed to clients
    pub map: String,
    /// Whether clients should render power-up pickups
    pub power_ups: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            metrics_port: 9090,
            max_matches: 100,
            heartbeat_interval_secs: net::HEARTBEAT_INTERVAL_SECS,
            heartbeat_max_missed: net::HEARTBEAT_MAX_MISSED,
            ball_speed: ball::SPEED,
            paddle_height: paddle::HEIGHT,
            win_score: score::WIN_SCORE,
            map: "classic".to_string(),
            power_ups: false,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                if parsed > 0 {
                    config.port = parsed;
                } else {
                    tracing::warn!("PORT must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid PORT '{}', using default", port);
            }
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                if parsed > 0 {
                    config.metrics_port = parsed;
                } else {
                    tracing::warn!("METRICS_PORT must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid METRICS_PORT '{}', using default", port);
            }
        }

        if let Ok(max_matches) = std::env::var("MAX_MATCHES") {
            if let Ok(parsed) = max_matches.parse::<usize>() {
                if parsed > 0 && parsed <= 10_000 {
                    config.max_matches = parsed;
                } else {
                    tracing::warn!("MAX_MATCHES must be 1-10000, using default");
                }
            } else {
                tracing::warn!("Invalid MAX_MATCHES '{}', using default", max_matches);
            }
        }

        if let Ok(interval) = std::env::var("HEARTBEAT_INTERVAL_SECS") {
            if let Ok(parsed) = interval.parse::<u64>() {
                if (1..=300).contains(&parsed) {
                    config.heartbeat_interval_secs = parsed;
                } else {
                    tracing::warn!("HEARTBEAT_INTERVAL_SECS must be 1-300, using default");
                }
            } else {
                tracing::warn!("Invalid HEARTBEAT_INTERVAL_SECS '{}', using default", interval);
            }
        }

        if let Ok(missed) = std::env::var("HEARTBEAT_MAX_MISSED") {
            if let Ok(parsed) = missed.parse::<u32>() {
                if (1..=100).contains(&parsed) {
                    config.heartbeat_max_missed = parsed;
                } else {
                    tracing::warn!("HEARTBEAT_MAX_MISSED must be 1-100, using default");
                }
            } else {
                tracing::warn!("Invalid HEARTBEAT_MAX_MISSED '{}', using default", missed);
            }
        }

        if let Ok(speed) = std::env::var("BALL_SPEED") {
            if let Ok(parsed) = speed.parse::<f32>() {
                if parsed.is_finite() && parsed > 0.0 && parsed <= 50.0 {
                    config.ball_speed = parsed;
                } else {
                    tracing::warn!("BALL_SPEED must be in (0, 50], using default");
                }
            } else {
                tracing::warn!("Invalid BALL_SPEED '{}', using default", speed);
            }
        }

        if let Ok(height) = std::env::var("PADDLE_HEIGHT") {
            if let Ok(parsed) = height.parse::<f32>() {
                if parsed.is_finite() && parsed > 0.0 && parsed <= field::HEIGHT {
                    config.paddle_height = parsed;
                } else {
                    tracing::warn!(
                        "PADDLE_HEIGHT must be in (0, {}], using default",
                        field::HEIGHT
                    );
                }
            } else {
                tracing::warn!("Invalid PADDLE_HEIGHT '{}', using default", height);
            }
        }

        if let Ok(win_score) = std::env::var("WIN_SCORE") {
            if let Ok(parsed) = win_score.parse::<u32>() {
                if parsed > 0 && parsed <= 100 {
                    config.win_score = parsed;
                } else {
                    tracing::warn!("WIN_SCORE must be 1-100, using default");
                }
            } else {
                tracing::warn!("Invalid WIN_SCORE '{}', using default", win_score);
            }
        }

        if let Ok(map) = std::env::var("MAP") {
            if !map.is_empty() {
                config.map = map;
            }
        }

        if let Ok(power_ups) = std::env::var("POWER_UPS") {
            match power_ups.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => config.power_ups = true,
                "0" | "false" | "off" => config.power_ups = false,
                other => tracing::warn!("Invalid POWER_UPS '{}', using default", other),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.metrics_port == self.port {
            return Err("metrics_port must differ from port".to_string());
        }
        if self.max_matches == 0 {
            return Err("max_matches must be at least 1".to_string());
        }
        if self.heartbeat_interval_secs == 0 {
            return Err("heartbeat_interval_secs must be at least 1".to_string());
        }
        if self.heartbeat_max_missed == 0 {
            return Err("heartbeat_max_missed must be at least 1".to_string());
        }
        if !self.ball_speed.is_finite() || self.ball_speed <= 0.0 {
            return Err("ball_speed must be a positive number".to_string());
        }
        if !self.paddle_height.is_finite()
            || self.paddle_height <= 0.0
            || self.paddle_height > field::HEIGHT
        {
            return Err(format!(
                "paddle_height must be in (0, {}]",
                field::HEIGHT
            ));
        }
        if self.win_score == 0 {
            return Err("win_score must be at least 1".to_string());
        }
        Ok(())
    }

    /// Address of the WebSocket endpoint.
    pub fn game_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Address of the metrics/health endpoint.
    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.metrics_port)
    }

    /// Settings applied to every match this server creates.
    pub fn game_settings(&self) -> GameSettings {
        GameSettings {
            ball_speed: self.ball_speed,
            paddle_height: self.paddle_height,
            win_score: self.win_score,
            map: self.map.clone(),
            power_ups: self.power_ups,
        }
    }
}
