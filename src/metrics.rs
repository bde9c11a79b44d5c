//! Prometheus-compatible metrics endpoint
//!
//! Exposes arena server metrics in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::game::game_loop::GameLoopEvent;
use crate::game::performance::{PerformanceMonitor, PerformanceStatus};
use crate::game::state::{BlockKind, World};

/// Metrics registry for the arena server
#[derive(Debug)]
pub struct Metrics {
    // Player counts
    pub registered_players: AtomicU64,
    pub alive_players: AtomicU64,

    // Board
    pub static_blocks: AtomicU64,
    pub updating_blocks: AtomicU64,
    pub rockets: AtomicU64,

    // Match state
    pub state_version: AtomicU64,
    /// 0=CollectPlayers, 1=RoundStart, 2=Round, 3=RoundEnd
    pub stage: AtomicU64,
    pub rounds_started: AtomicU64,

    // Event counters
    pub kills_total: AtomicU64,
    pub detonations_total: AtomicU64,
    pub ammo_collected_total: AtomicU64,
    pub rockets_fired_total: AtomicU64,
    pub snapshots_built: AtomicU64,
    pub commands_rejected: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,
    /// Ticks run by the most recent update call
    pub catch_up_ticks: AtomicU64,
    pub catch_up_ticks_max: AtomicU64,

    // Performance status (0=Excellent, 1=Good, 2=Warning, 3=Critical)
    pub performance_status: AtomicU64,
    pub budget_usage_percent: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            registered_players: AtomicU64::new(0),
            alive_players: AtomicU64::new(0),
            static_blocks: AtomicU64::new(0),
            updating_blocks: AtomicU64::new(0),
            rockets: AtomicU64::new(0),
            state_version: AtomicU64::new(0),
            stage: AtomicU64::new(0),
            rounds_started: AtomicU64::new(0),
            kills_total: AtomicU64::new(0),
            detonations_total: AtomicU64::new(0),
            ammo_collected_total: AtomicU64::new(0),
            rockets_fired_total: AtomicU64::new(0),
            snapshots_built: AtomicU64::new(0),
            commands_rejected: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            catch_up_ticks: AtomicU64::new(0),
            catch_up_ticks_max: AtomicU64::new(0),
            performance_status: AtomicU64::new(0),
            budget_usage_percent: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(1000)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Record how many ticks one update call had to run
    pub fn record_catch_up(&self, ticks: u32) {
        self.catch_up_ticks.store(ticks as u64, Ordering::Relaxed);
        self.catch_up_ticks_max.fetch_max(ticks as u64, Ordering::Relaxed);
    }

    /// Refresh the board and player gauges
    pub fn observe_world(&self, world: &World) {
        self.registered_players.store(world.players.len() as u64, Ordering::Relaxed);
        self.alive_players.store(world.alive_count() as u64, Ordering::Relaxed);
        self.static_blocks.store(world.static_blocks.len() as u64, Ordering::Relaxed);
        self.updating_blocks.store(world.updating.len() as u64, Ordering::Relaxed);
        let rockets = world.updating.iter().filter(|b| b.kind == BlockKind::Rocket).count();
        self.rockets.store(rockets as u64, Ordering::Relaxed);
        self.state_version.store(world.version(), Ordering::Relaxed);
        self.stage.store(world.stage.as_index(), Ordering::Relaxed);
    }

    pub fn observe_performance(&self, monitor: &PerformanceMonitor) {
        let status = match monitor.status() {
            PerformanceStatus::Excellent => 0,
            PerformanceStatus::Good => 1,
            PerformanceStatus::Warning => 2,
            PerformanceStatus::Critical => 3,
        };
        self.performance_status.store(status, Ordering::Relaxed);
        self.budget_usage_percent
            .store(monitor.budget_usage_percent() as u64, Ordering::Relaxed);
    }

    /// Count a game loop event
    pub fn record_event(&self, event: &GameLoopEvent) {
        let counter = match event {
            GameLoopEvent::PlayerKilled { .. } => &self.kills_total,
            GameLoopEvent::MineDetonated { .. } => &self.detonations_total,
            GameLoopEvent::AmmoCollected { .. } => &self.ammo_collected_total,
            GameLoopEvent::RocketFired { .. } => &self.rockets_fired_total,
            GameLoopEvent::StageChanged { .. } => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn stage_name(&self) -> &'static str {
        match self.stage.load(Ordering::Relaxed) {
            0 => "collect_players",
            1 => "round_start",
            2 => "round",
            _ => "round_end",
        }
    }

    fn status_name(&self) -> &'static str {
        match self.performance_status.load(Ordering::Relaxed) {
            0 => "excellent",
            1 => "good",
            2 => "warning",
            _ => "critical",
        }
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

        metric!("snake_arena_players_registered", "Number of registered players", "gauge",
            self.registered_players.load(Ordering::Relaxed));
        metric!("snake_arena_players_alive", "Number of alive players", "gauge",
            self.alive_players.load(Ordering::Relaxed));

        metric!("snake_arena_static_blocks", "Blocks in the static map", "gauge",
            self.static_blocks.load(Ordering::Relaxed));
        metric!("snake_arena_updating_blocks", "Heads, live tails and rockets", "gauge",
            self.updating_blocks.load(Ordering::Relaxed));
        metric!("snake_arena_rockets", "Rockets in flight", "gauge",
            self.rockets.load(Ordering::Relaxed));

        metric!("snake_arena_state_version", "Current world state version", "gauge",
            self.state_version.load(Ordering::Relaxed));
        metric!("snake_arena_stage", "Match stage (0=CollectPlayers, 3=RoundEnd)", "gauge",
            self.stage.load(Ordering::Relaxed));
        metric!("snake_arena_rounds_started_total", "Rounds started", "counter",
            self.rounds_started.load(Ordering::Relaxed));

        metric!("snake_arena_kills_total", "Players killed", "counter",
            self.kills_total.load(Ordering::Relaxed));
        metric!("snake_arena_detonations_total", "Mines detonated", "counter",
            self.detonations_total.load(Ordering::Relaxed));
        metric!("snake_arena_ammo_collected_total", "Ammo pickups eaten", "counter",
            self.ammo_collected_total.load(Ordering::Relaxed));
        metric!("snake_arena_rockets_fired_total", "Rockets fired by players", "counter",
            self.rockets_fired_total.load(Ordering::Relaxed));
        metric!("snake_arena_snapshots_built_total", "Snapshots materialised", "counter",
            self.snapshots_built.load(Ordering::Relaxed));
        metric!("snake_arena_commands_rejected_total", "Player calls rejected by validation", "counter",
            self.commands_rejected.load(Ordering::Relaxed));

        metric!("snake_arena_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("snake_arena_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("snake_arena_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("snake_arena_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("snake_arena_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("snake_arena_catch_up_ticks", "Ticks run by the last update", "gauge",
            self.catch_up_ticks.load(Ordering::Relaxed));
        metric!("snake_arena_catch_up_ticks_max", "Most ticks run by a single update", "gauge",
            self.catch_up_ticks_max.load(Ordering::Relaxed));

        metric!("snake_arena_performance_status", "Performance status (0=Excellent, 3=Critical)", "gauge",
            self.performance_status.load(Ordering::Relaxed));
        metric!("snake_arena_budget_usage_percent", "Tick budget usage percentage", "gauge",
            self.budget_usage_percent.load(Ordering::Relaxed));
        output.push_str(&format!(
            "# HELP snake_arena_performance_state Human-readable performance state\n# TYPE snake_arena_performance_state gauge\nsnake_arena_performance_state{{state=\"{}\"}} 1\n",
            self.status_name()
        ));

        metric!("snake_arena_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics (alternative for direct API access)
    pub fn to_json(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        serde_json::json!({
            "players": {
                "registered": load(&self.registered_players),
                "alive": load(&self.alive_players),
            },
            "board": {
                "static_blocks": load(&self.static_blocks),
                "updating_blocks": load(&self.updating_blocks),
                "rockets": load(&self.rockets),
            },
            "match": {
                "version": load(&self.state_version),
                "stage": self.stage_name(),
                "rounds_started": load(&self.rounds_started),
                "kills": load(&self.kills_total),
                "detonations": load(&self.detonations_total),
                "ammo_collected": load(&self.ammo_collected_total),
                "rockets_fired": load(&self.rockets_fired_total),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
                "catch_up_ticks": load(&self.catch_up_ticks),
                "catch_up_ticks_max": load(&self.catch_up_ticks_max),
                "status": load(&self.performance_status),
                "status_name": self.status_name(),
                "budget_percent": load(&self.budget_usage_percent),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Build the HTTP response for a raw request
///
/// `/metrics/json` is matched before its `/metrics` prefix.
fn route(request: &str, metrics: &Metrics) -> String {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("GET "))
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("");

    match path {
        "/metrics/json" | "/json" => http_response("application/json", &metrics.to_json()),
        "/metrics" => http_response("text/plain; version=0.0.4", &metrics.to_prometheus()),
        "/health" | "/" => http_response("text/plain", "OK"),
        _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
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
                    let response = route(&request, &metrics);
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
