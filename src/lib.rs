//! Snake Arena Server Library
//!
//! Tick-driven simulation core for a multiplayer snake arena: players steer
//! heads that leave expiring tails, collect ammo, fire rockets and set off
//! mines until one survivor is left.
//!
//! # Features
//!
//! - `metrics_endpoint` - Prometheus/JSON metrics over HTTP (enabled by default)
//! - `profiling` - Periodic per-section tick timing reports (enabled by default)

pub mod config;
pub mod game;
pub mod host;
pub mod lobby;
pub mod metrics;
pub mod net;
pub mod util;

pub use config::GameConfig;
pub use lobby::room::{GameRoom, SharedRoom, ValidationError};
pub use net::protocol::{dispatch, Request, Response};
