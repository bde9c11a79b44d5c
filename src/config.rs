use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::game::constants::{round, tail};

/// Where the external transport should listen
///
/// The simulation core does not care; the host passes it through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Loopback only, single machine play
    Local,
    /// All interfaces
    Networked,
}

impl FromStr for BindMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BindMode::Local),
            "networked" | "network" | "remote" => Ok(BindMode::Networked),
            other => Err(ConfigError::InvalidValue {
                key: "BIND_MODE",
                value: other.to_string(),
            }),
        }
    }
}

/// Game server configuration
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// World width in cells
    pub width: i32,
    /// World height in cells
    pub height: i32,
    /// Wall-clock duration of one simulation tick
    pub tick_interval: Duration,
    /// Tail segments a snake trails at the start of a round
    pub tail_length: u32,
    /// Heads advance once every this many ticks
    pub head_move_interval: u32,
    /// Border walls around the arena
    pub walls: bool,
    /// Scatter mines at round start
    pub mines: bool,
    /// Scatter ammo pickups at round start (limited ammo mode)
    pub ammo: bool,
    /// Firing never consumes inventory
    pub unlimited_ammo: bool,
    /// Transport bind mode
    pub bind_mode: BindMode,
    /// Address the transport binds to (derived from bind mode unless overridden)
    pub bind_address: IpAddr,
    /// Transport port
    pub port: u16,
    /// Metrics endpoint port
    pub metrics_port: u16,
    /// Fixed RNG seed for reproducible arenas (random when unset)
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 80,
            height: 24,
            tick_interval: Duration::from_millis(50),
            tail_length: tail::DEFAULT_LENGTH,
            head_move_interval: round::DEFAULT_HEAD_MOVE_INTERVAL,
            walls: true,
            mines: true,
            ammo: true,
            unlimited_ammo: false,
            bind_mode: BindMode::Local,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 7777,
            metrics_port: 9090,
            seed: None,
        }
    }
}

/// Parse an environment variable, warning and returning `None` on bad input
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

/// Parse a boolean flag accepting the usual spellings
fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Invalid {} '{}', expected true/false", key, raw);
            None
        }
    }
}

impl GameConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(width) = env_parse::<i32>("ARENA_WIDTH") {
            if width >= MIN_WORLD_SIDE {
                config.width = width;
            } else {
                tracing::warn!("ARENA_WIDTH must be >= {}, using default", MIN_WORLD_SIDE);
            }
        }

        if let Some(height) = env_parse::<i32>("ARENA_HEIGHT") {
            if height >= MIN_WORLD_SIDE {
                config.height = height;
            } else {
                tracing::warn!("ARENA_HEIGHT must be >= {}, using default", MIN_WORLD_SIDE);
            }
        }

        if let Some(ms) = env_parse::<u64>("TICK_INTERVAL_MS") {
            if ms > 0 {
                config.tick_interval = Duration::from_millis(ms);
            } else {
                tracing::warn!("TICK_INTERVAL_MS must be > 0, using default");
            }
        }

        if let Some(length) = env_parse::<u32>("TAIL_LENGTH") {
            config.tail_length = length;
        }

        if let Some(interval) = env_parse::<u32>("HEAD_MOVE_INTERVAL") {
            if interval > 0 {
                config.head_move_interval = interval;
            } else {
                tracing::warn!("HEAD_MOVE_INTERVAL must be > 0, using default");
            }
        }

        if let Some(walls) = env_flag("WALLS") {
            config.walls = walls;
        }
        if let Some(mines) = env_flag("MINES") {
            config.mines = mines;
        }
        if let Some(ammo) = env_flag("AMMO") {
            config.ammo = ammo;
        }
        if let Some(unlimited) = env_flag("UNLIMITED_AMMO") {
            config.unlimited_ammo = unlimited;
        }

        if let Ok(mode) = std::env::var("BIND_MODE") {
            match mode.parse::<BindMode>() {
                Ok(parsed) => {
                    config.bind_mode = parsed;
                    config.bind_address = match parsed {
                        BindMode::Local => IpAddr::V4(Ipv4Addr::LOCALHOST),
                        BindMode::Networked => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    };
                }
                Err(e) => tracing::warn!("{}, using default", e),
            }
        }

        if let Some(addr) = env_parse::<IpAddr>("BIND_ADDRESS") {
            config.bind_address = addr;
        }

        if let Some(port) = env_parse::<u16>("PORT") {
            if port > 0 {
                config.port = port;
            } else {
                tracing::warn!("PORT must be > 0, using default");
            }
        }

        if let Some(port) = env_parse::<u16>("METRICS_PORT") {
            config.metrics_port = port;
        }

        if let Some(seed) = env_parse::<u64>("WORLD_SEED") {
            config.seed = Some(seed);
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width < MIN_WORLD_SIDE || self.height < MIN_WORLD_SIDE {
            return Err(ConfigError::WorldTooSmall {
                width: self.width,
                height: self.height,
            });
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        if self.head_move_interval == 0 {
            return Err(ConfigError::ZeroHeadMoveInterval);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PORT",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Number of ticks in one stage pause (round start / round end)
    pub fn stage_pause_ticks(&self) -> u32 {
        let ticks = (round::STAGE_PAUSE.as_secs_f64() / self.tick_interval.as_secs_f64()).ceil();
        (ticks as u32).max(1)
    }

    /// Convert a wall-clock period into whole ticks (at least one)
    pub fn ticks_for(&self, period: Duration) -> u64 {
        let ticks = (period.as_secs_f64() / self.tick_interval.as_secs_f64()).round();
        (ticks as u64).max(1)
    }
}

/// Smallest allowed world side, in cells
pub const MIN_WORLD_SIDE: i32 = 4;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("World must be at least {min}x{min}, got {width}x{height}", min = MIN_WORLD_SIDE)]
    WorldTooSmall { width: i32, height: i32 },
    #[error("Tick interval must be greater than zero")]
    ZeroTickInterval,
    #[error("Head move interval must be at least 1 tick")]
    ZeroHeadMoveInterval,
    #[error("Invalid {key} '{value}'")]
    InvalidValue { key: &'static str, value: String },
}
