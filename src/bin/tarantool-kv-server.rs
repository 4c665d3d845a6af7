//! tarantool-kv HTTP API server.

use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tower_http::trace::TraceLayer;

use tarantool_kv::server::{AppState, Config, init_logging, router};

/// tarantool-kv HTTP API server.
#[derive(Parser, Debug)]
#[command(name = "tarantool-kv-server")]
#[command(about = "HTTP key-value API backed by a Tarantool space")]
struct Args {
    /// Path to the configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address: a port (`8080`, on the configured bind address),
    /// `:8080` for all interfaces, or `host:8080`.
    #[arg(long = "port", env = "APP_PORT")]
    listen: Option<String>,

    /// Tarantool `host:port`.
    #[arg(long, env = "TARANTOOL_ADDRESS")]
    tarantool_address: Option<String>,

    /// Tarantool user.
    #[arg(long, env = "TARANTOOL_USER")]
    tarantool_user: Option<String>,

    /// Tarantool password.
    #[arg(long, env = "TARANTOOL_PASSWORD", hide_env_values = true)]
    tarantool_password: Option<String>,

    /// Keep records in process memory instead of Tarantool.
    #[arg(long)]
    memory: bool,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(listen) = &self.listen {
            config.server.set_listen(listen)?;
        }
        if let Some(address) = &self.tarantool_address {
            config.tarantool.address = address.clone();
        }
        if let Some(user) = &self.tarantool_user {
            config.tarantool.user = user.clone();
        }
        if let Some(password) = &self.tarantool_password {
            config.tarantool.password = Some(password.clone());
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration first (needed for logging setup)
    let config = args.load_config()?;
    init_logging(&config.logging)?;

    let state = if args.memory {
        tracing::warn!("Using in-memory store; records are lost on exit");
        AppState::in_memory(&config).await?
    } else {
        tracing::info!(
            address = %config.tarantool.address,
            space = %config.tarantool.space,
            "Connecting to store"
        );
        AppState::connect(&config).await?
    };

    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Starting server on {}", listener.local_addr()?);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
