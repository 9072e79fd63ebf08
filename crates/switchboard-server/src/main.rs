//! Switchboard server binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory history (lost on restart)
//! switchboard-server --bind 0.0.0.0:8080
//!
//! # Durable history
//! switchboard-server --bind 0.0.0.0:8080 --store /var/lib/switchboard/history.redb
//! ```

use std::path::PathBuf;

use clap::Parser;
use switchboard_server::{
    DriverConfig, Server, ServerRuntimeConfig, ShutdownHandle, StorageConfig,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Switchboard message routing hub
#[derive(Parser, Debug)]
#[command(name = "switchboard-server")]
#[command(about = "Real-time WebSocket message routing hub")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, env = "SWITCHBOARD_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Path to the durable history store; in-memory history if omitted
    #[arg(short, long, env = "SWITCHBOARD_STORE")]
    store: Option<PathBuf>,

    /// Records kept by the in-memory history store
    #[arg(long, default_value = "100")]
    memory_capacity: usize,

    /// Records returned by get-history with the durable store
    #[arg(long, default_value = "100")]
    durable_history_limit: usize,

    /// Records returned by get-history with the in-memory store
    #[arg(long, default_value = "50")]
    memory_history_limit: usize,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Switchboard server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        storage: StorageConfig { path: args.store, memory_capacity: args.memory_capacity },
        driver: DriverConfig {
            max_connections: args.max_connections,
            durable_history_limit: args.durable_history_limit,
            memory_history_limit: args.memory_history_limit,
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    tokio::spawn(shutdown_on_signal(server.shutdown_handle()));

    server.run().await?;

    Ok(())
}

/// Request shutdown on SIGINT or SIGTERM.
async fn shutdown_on_signal(handle: ShutdownHandle) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }

    handle.shutdown();
}
