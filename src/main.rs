mod adapter;
mod config;
mod dashboard;
mod dispatcher;
mod error;
mod hierarchy;
mod model;
mod recorder;
mod routes;
mod server;
mod state;
mod store;

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use config::{CliArgs, EngineConfig};
use state::EngineState;
use store::TestStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "testlab_engine=info,tower_http=info".into()),
        )
        .init();

    let args = CliArgs::parse();
    info!("Starting testlab-engine v{}", env!("CARGO_PKG_VERSION"));
    info!("Data dir: {:?}", args.data_dir);
    info!("Scripts dir: {:?}", args.scripts_dir);

    if !args.data_dir.exists() {
        error!("Data directory does not exist: {:?}", args.data_dir);
        std::process::exit(1);
    }
    if !args.scripts_dir.exists() {
        error!("Scripts directory does not exist: {:?}", args.scripts_dir);
        std::process::exit(1);
    }

    let config = EngineConfig::from_args(args);
    let port = config.port;

    // TestStore::new also marks any execution left 'running' by a previous
    // engine process as errored.
    let store = TestStore::new(&config.data_dir)?;

    let state = Arc::new(EngineState::new(config, store));

    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Engine listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Engine shutting down");

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal");
}
