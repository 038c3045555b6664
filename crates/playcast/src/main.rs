mod cli;
mod config;
mod gateway;
mod router;
mod server;
mod supervisor;

#[cfg(test)]
mod integration_tests;

use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use playcast_core::OBSERVER_CAPACITY;

use crate::config::Config;
use crate::gateway::Gateway;
use crate::router::ResponseRouter;

#[tokio::main]
async fn main() {
    // Initialize tracing with RUST_LOG support
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Load config and layer CLI overrides on top
    let mut config = match Config::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!(
        listen = %config.server.listen,
        connectors = config.connectors.len(),
        "playcast starting"
    );

    // Observer channel shared by every connector and WebSocket client
    let (observer, _) = broadcast::channel(OBSERVER_CAPACITY);

    // Connect and start every connector
    let supervisor = match supervisor::start(&config, observer.clone()).await {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("Failed to start connectors: {}", e);
            std::process::exit(1);
        }
    };

    let gateway = Gateway::new(supervisor.handles().to_vec());
    let router = ResponseRouter::new(observer);

    // Serve until interrupted, the server fails, or every connector is gone
    let mut exit_code = 0;
    tokio::select! {
        result = server::run_server(&config.server.listen, gateway, router) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                exit_code = 1;
            }
        }
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("interrupted"),
                Err(e) => error!("Failed to listen for ctrl-c: {}", e),
            }
        }
        _ = supervisor.wait() => {
            info!("all connectors closed");
        }
    }

    // Signal shutdown and wait for every connector to close
    supervisor.shutdown();
    supervisor.wait().await;
    info!("playcast shut down");

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}
