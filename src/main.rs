use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use snake_arena_server::config::GameConfig;
use snake_arena_server::host;
use snake_arena_server::lobby::room::GameRoom;
use snake_arena_server::metrics::{self, Metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Snake Arena Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = GameConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {}x{} arena, {:?} tick, {:?} bind on {}:{}",
        config.width, config.height, config.tick_interval, config.bind_mode, config.bind_address, config.port
    );

    // Initialize metrics
    let metrics = Arc::new(Metrics::new());

    if cfg!(feature = "metrics_endpoint") {
        let addr = SocketAddr::new(config.bind_address, config.metrics_port);
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, addr).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let room = GameRoom::with_metrics(&config, metrics).shared();

    // Shutdown signal handler
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Shutdown signal received");
    };

    host::run_driver(room.clone(), config.tick_interval, shutdown).await;

    let room = room.lock();
    info!(
        "Server stopped after {} ticks, {} rounds, {} players registered",
        room.world().tick,
        room.game_loop().rounds_started(),
        room.player_count()
    );

    Ok(())
}
