//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma-separated. Any origin when unset.
    pub client_origin: Option<String>,

    pub game: GameConfig,
    pub matchmaking: MatchmakingConfig,
}

/// Round timing and anti-cheat tuning
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Rounds per match
    pub rounds_per_match: u32,
    /// Lower bound of the randomized round-start to cue delay
    pub cue_delay_min: Duration,
    /// Upper bound of the randomized round-start to cue delay
    pub cue_delay_max: Duration,
    /// Pause between a round ending and the next one starting
    pub next_round_delay: Duration,
    /// How long a finished room lingers before it is reaped
    pub finished_room_ttl: Duration,
    /// Number of selectable maps (cosmetic, indexed by clients)
    pub map_count: u32,
    /// Reaction times at or above this mark an early fire
    pub early_fire_sentinel: f64,
    pub reaction: ReactionLimits,
}

/// Plausibility bounds for a client-reported reaction time, in milliseconds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReactionLimits {
    pub min_ms: f64,
    pub max_ms: f64,
    pub slack_ms: f64,
}

/// Pairing window and queue timing
#[derive(Clone, Debug)]
pub struct MatchmakingConfig {
    /// Rating difference accepted with no wait
    pub window_base: u32,
    /// Wait seconds per window step
    pub window_step_secs: u32,
    /// Window growth per step
    pub window_step_increment: u32,
    /// Delay before matched players are marked ready
    pub auto_ready_delay: Duration,
    /// Delay before re-running pairing after a successful match
    pub repair_delay: Duration,
    /// Interval of the background pairing sweep
    pub sweep_interval: Duration,
}

impl Default for ReactionLimits {
    fn default() -> Self {
        Self {
            min_ms: 50.0,
            max_ms: 5000.0,
            slack_ms: 100.0,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            rounds_per_match: 5,
            cue_delay_min: Duration::from_millis(2000),
            cue_delay_max: Duration::from_millis(5000),
            next_round_delay: Duration::from_millis(3000),
            finished_room_ttl: Duration::from_millis(30_000),
            map_count: 5,
            early_fire_sentinel: 99_999.0,
            reaction: ReactionLimits::default(),
        }
    }
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            window_base: 100,
            window_step_secs: 10,
            window_step_increment: 50,
            auto_ready_delay: Duration::from_millis(2000),
            repair_delay: Duration::from_millis(100),
            sweep_interval: Duration::from_millis(1000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            log_level: "info".to_string(),
            client_origin: None,
            game: GameConfig::default(),
            matchmaking: MatchmakingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        };

        let game_defaults = GameConfig::default();
        let mm_defaults = MatchmakingConfig::default();

        let game = GameConfig {
            rounds_per_match: parse_or("ROUNDS_PER_MATCH", game_defaults.rounds_per_match)?,
            cue_delay_min: millis_or("CUE_DELAY_MIN_MS", game_defaults.cue_delay_min)?,
            cue_delay_max: millis_or("CUE_DELAY_MAX_MS", game_defaults.cue_delay_max)?,
            next_round_delay: millis_or("NEXT_ROUND_DELAY_MS", game_defaults.next_round_delay)?,
            finished_room_ttl: millis_or("FINISHED_ROOM_TTL_MS", game_defaults.finished_room_ttl)?,
            map_count: game_defaults.map_count,
            early_fire_sentinel: game_defaults.early_fire_sentinel,
            reaction: ReactionLimits {
                min_ms: parse_or("REACTION_MIN_MS", game_defaults.reaction.min_ms)?,
                max_ms: parse_or("REACTION_MAX_MS", game_defaults.reaction.max_ms)?,
                slack_ms: parse_or("REACTION_SLACK_MS", game_defaults.reaction.slack_ms)?,
            },
        };

        let matchmaking = MatchmakingConfig {
            window_base: parse_or("MATCH_WINDOW_BASE", mm_defaults.window_base)?,
            window_step_secs: parse_or("MATCH_WINDOW_STEP_SECS", mm_defaults.window_step_secs)?,
            window_step_increment: parse_or(
                "MATCH_WINDOW_STEP_INCREMENT",
                mm_defaults.window_step_increment,
            )?,
            auto_ready_delay: millis_or("AUTO_READY_DELAY_MS", mm_defaults.auto_ready_delay)?,
            repair_delay: millis_or("REPAIR_DELAY_MS", mm_defaults.repair_delay)?,
            sweep_interval: millis_or("QUEUE_SWEEP_MS", mm_defaults.sweep_interval)?,
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),

            game,
            matchmaking,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the lobby cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.game.rounds_per_match == 0 {
            return Err(ConfigError::Invalid("ROUNDS_PER_MATCH"));
        }
        if self.game.cue_delay_min > self.game.cue_delay_max {
            return Err(ConfigError::Invalid("CUE_DELAY_MIN_MS"));
        }
        let reaction = &self.game.reaction;
        for (name, value) in [
            ("REACTION_MIN_MS", reaction.min_ms),
            ("REACTION_MAX_MS", reaction.max_ms),
            ("REACTION_SLACK_MS", reaction.slack_ms),
        ] {
            // NaN would make every bound comparison false
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(name));
            }
        }
        if reaction.min_ms > reaction.max_ms {
            return Err(ConfigError::Invalid("REACTION_MIN_MS"));
        }
        if self.matchmaking.window_step_secs == 0 {
            return Err(ConfigError::Invalid("MATCH_WINDOW_STEP_SECS"));
        }
        if self.matchmaking.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid("QUEUE_SWEEP_MS"));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn millis_or(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let ms = parse_or(name, default.as_millis() as u64)?;
    Ok(Duration::from_millis(ms))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
