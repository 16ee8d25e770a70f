/// Play-field constants (units are abstract pixels; the field is a fixed
/// 800x600 rectangle with the origin at the top-left corner)
pub mod field {
    /// Field width in units
    pub const WIDTH: f32 = 800.0;
    /// Field height in units
    pub const HEIGHT: f32 = 600.0;
}

/// Paddle constants
pub mod paddle {
    /// Paddle width in units
    pub const WIDTH: f32 = 10.0;
    /// Default paddle height in units (overridable per match via settings)
    pub const HEIGHT: f32 = 100.0;
    /// Horizontal inset of each paddle face from its wall
    pub const MARGIN: f32 = 20.0;
    /// Velocity-to-displacement factor in units per millisecond.
    /// Applied as: y += velocity * SPEED * dt_ms
    pub const SPEED: f32 = 0.5;
}

/// Ball constants
pub mod ball {
    /// Ball radius in units
    pub const RADIUS: f32 = 8.0;
    /// Default scalar ball speed in units per tick (overridable via settings)
    pub const SPEED: f32 = 5.0;
    /// Smallest allowed |speed_y| after any wall or paddle bounce.
    /// Keeps rallies from collapsing into a flat horizontal loop.
    pub const MIN_VERTICAL_SPEED: f32 = 1.0;
    /// Uniform jitter range (+/-) added to speed_y on every bounce
    pub const BOUNCE_JITTER: f32 = 1.0;
    /// Maximum deflection off a paddle edge (45 degrees)
    pub const MAX_BOUNCE_ANGLE: f32 = std::f32::consts::FRAC_PI_4;
    /// Maximum serve deflection from horizontal (22.5 degrees)
    pub const SERVE_MAX_ANGLE: f32 = std::f32::consts::FRAC_PI_8;
    /// Probability that a serve is perfectly horizontal
    pub const HORIZONTAL_SERVE_CHANCE: f64 = 0.3;
}

/// Scoring constants
pub mod score {
    /// Points needed to win a game (overridable via settings)
    pub const WIN_SCORE: u32 = 5;
}

/// Simulation cadence
pub mod tick {
    /// Server tick rate in Hz
    pub const RATE: u32 = 60;
    /// Tick duration in milliseconds
    pub const DURATION_MS: u64 = 1000 / RATE as u64;
    /// Delta time per tick in milliseconds (paddle integration step)
    pub const DT_MS: f32 = DURATION_MS as f32;
    /// Ticks between periodic per-match stats log lines
    pub const STATS_LOG_INTERVAL: u64 = 30 * RATE as u64;
}

/// Connection-layer tunables
pub mod net {
    /// Seconds between server-initiated heartbeat probes
    pub const HEARTBEAT_INTERVAL_SECS: u64 = 5;
    /// Probes a client may leave unanswered before it is considered gone
    pub const HEARTBEAT_MAX_MISSED: u32 = 3;
    /// Depth of the per-connection outbound message queue
    pub const OUTBOUND_QUEUE_DEPTH: usize = 64;
    /// Largest accepted inbound text frame in bytes
    pub const MAX_FRAME_BYTES: usize = 4 * 1024;
}
