use std::sync::Arc;

use tracing::{error, info, Level};

use pong_duel_server::config::ServerConfig;
use pong_duel_server::metrics::{self, Metrics};
use pong_duel_server::net::connection::ConnectionRegistry;
use pong_duel_server::net::server::PongServer;
use pong_duel_server::session::registry::MatchRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Pong Duel Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    if let Err(e) = config.validate() {
        anyhow::bail!("Invalid configuration: {e}");
    }
    info!(
        "Configuration loaded: {}:{}, max_matches={}, win_score={}",
        config.bind_address, config.port, config.max_matches, config.win_score
    );

    // Initialize metrics and the metrics endpoint
    let metrics = Arc::new(Metrics::new());
    let metrics_addr = config.metrics_addr();
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Initialize shared state
    let connections = Arc::new(ConnectionRegistry::new());
    let matches = Arc::new(MatchRegistry::new(
        config.game_settings(),
        config.max_matches,
    ));

    let server = PongServer::new(
        config.clone(),
        matches.clone(),
        connections.clone(),
        metrics.clone(),
    );

    // Shutdown signal handler
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    // Run server with graceful shutdown
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    // Cleanup
    matches.shutdown_all().await;
    info!("Server stopped");

    Ok(())
}
