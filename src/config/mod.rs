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

    /// HS256 secret used to verify join tokens
    pub jwt_secret: String,

    /// Allowed client origins for CORS (comma-separated in CLIENT_ORIGIN)
    pub client_origin: String,
    /// Mount the /dev operator endpoints
    pub operator_routes: bool,

    /// Simulation tunables
    pub game: GameConfig,
}

/// Tunables for the authoritative simulation
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Snapshots broadcast per second
    pub snapshot_rate: u32,
    /// Arena radius (world units)
    pub arena_radius: f32,
    /// Movement speed (units per second)
    pub move_speed: f32,
    /// Minimum wall-clock interval between accepted throws
    pub throw_cooldown_ms: u64,
    /// Projectile speed (units per second)
    pub projectile_speed: f32,
    /// Projectile lifetime since spawn
    pub projectile_lifetime_ms: u64,
    /// Planar distance below which a projectile eliminates a participant
    pub hit_radius: f32,
    /// Participants needed before a countdown starts
    pub min_players: usize,
    /// Single-participant testing: skip countdown and ignore phase gating
    pub test_mode: bool,
}

impl GameConfig {
    /// Upper bound on the elapsed time integrated by one tick
    pub const MAX_TICK_DT: f32 = 0.05;
    /// Spawn points are sampled within this fraction of the arena radius
    pub const SPAWN_RADIUS_FRACTION: f32 = 0.7;
    /// Projectiles spawn this far above the thrower
    pub const THROW_HEIGHT: f32 = 1.0;
    /// Countdown length in whole seconds
    pub const COUNTDOWN_SECS: u32 = 3;
    /// Delay before resetting after the last survivor is decided
    pub const RESET_DELAY: Duration = Duration::from_millis(2500);
    /// Delay before resetting after population dropped mid-match
    pub const EARLY_RESET_DELAY: Duration = Duration::from_millis(1500);
    /// Lobby pause after a reset before the next countdown is attempted
    pub const REMATCH_DELAY: Duration = Duration::from_secs(2);

    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tick_rate as u64)
    }

    pub fn snapshot_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.snapshot_rate as u64)
    }

    /// Apply overrides from the environment on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            tick_rate: parse_var("TICK_RATE", defaults.tick_rate)?,
            snapshot_rate: parse_var("SNAPSHOT_RATE", defaults.snapshot_rate)?,
            arena_radius: parse_var("ARENA_RADIUS", defaults.arena_radius)?,
            move_speed: parse_var("MOVE_SPEED", defaults.move_speed)?,
            throw_cooldown_ms: parse_var("THROW_COOLDOWN_MS", defaults.throw_cooldown_ms)?,
            projectile_speed: parse_var("PROJECTILE_SPEED", defaults.projectile_speed)?,
            projectile_lifetime_ms: parse_var(
                "PROJECTILE_LIFETIME_MS",
                defaults.projectile_lifetime_ms,
            )?,
            hit_radius: parse_var("HIT_RADIUS", defaults.hit_radius)?,
            min_players: parse_var("MIN_PLAYERS", defaults.min_players)?,
            test_mode: parse_var("TEST_MODE", defaults.test_mode)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // A rate so high that its period rounds to zero would stall the timers
        if self.tick_rate == 0 || self.tick_duration().is_zero() {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }
        if self.snapshot_rate == 0 || self.snapshot_duration().is_zero() {
            return Err(ConfigError::Invalid("SNAPSHOT_RATE"));
        }
        if !(self.arena_radius.is_finite() && self.arena_radius > 0.0) {
            return Err(ConfigError::Invalid("ARENA_RADIUS"));
        }
        for (name, value) in [
            ("MOVE_SPEED", self.move_speed),
            ("PROJECTILE_SPEED", self.projectile_speed),
            ("HIT_RADIUS", self.hit_radius),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid(name));
            }
        }
        Ok(())
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            snapshot_rate: 18,
            arena_radius: 25.0,
            move_speed: 7.0,
            throw_cooldown_ms: 600,
            projectile_speed: 24.0,
            projectile_lifetime_ms: 1800,
            hit_radius: 1.2,
            min_players: 2,
            test_mode: false,
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
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,

            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            operator_routes: parse_var("OPERATOR_ROUTES", false)?,

            game: GameConfig::from_env()?,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
