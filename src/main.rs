//! blobgate -- authenticated, range-aware streaming gateway.
//!
//! SIGTERM/SIGINT stop accepting connections; in-flight streams get
//! `server.shutdown_timeout` seconds to finish before the process exits.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use blobgate::auth::SignedCookieGate;
use blobgate::config::{Config, DEFAULT_SESSION_SECRET};
use blobgate::storage::backend::StorageBackend;

/// Command-line arguments for the blobgate server.
#[derive(Parser, Debug)]
#[command(
    name = "blobgate",
    version,
    about = "Authenticated, range-aware streaming gateway over a blob store"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "blobgate.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = blobgate::config::load_config(&cli.config)?;
    init_tracing(&config);
    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        blobgate::metrics::init_metrics();
        blobgate::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let storage = build_storage(&config).await?;

    if config.auth.session_secret == DEFAULT_SESSION_SECRET {
        warn!("auth.session_secret is the built-in default; set a real secret before exposing this server");
    }
    let gate = SignedCookieGate::new(&config.auth.session_secret, &config.auth.cookie_name);

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(blobgate::AppState {
        config,
        storage,
        gate: Arc::new(gate),
    });

    let app = blobgate::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("blobgate listening on {}", bind_addr);

    // The signal both starts the graceful drain and arms the drain deadline.
    let (signal_tx, mut signal_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signal_tx.send(true);
        })
        .into_future();

    let deadline = async move {
        let _ = signal_rx.wait_for(|fired| *fired).await;
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = server => result?,
        _ = deadline => {
            warn!(
                "Open streams still running after {:?}; exiting",
                shutdown_timeout
            );
        }
    }

    info!("blobgate shut down");
    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `logging.level`; `logging.format: json` switches
/// to one JSON object per line.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Build the storage backend named by `storage.backend`.
async fn build_storage(config: &Config) -> anyhow::Result<Arc<dyn StorageBackend>> {
    let storage: Arc<dyn StorageBackend> = match config.storage.backend.as_str() {
        "aws" => {
            let aws_config = config.storage.aws.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.backend is 'aws' but storage.aws config section is missing")
            })?;
            let backend = blobgate::storage::aws::AwsBackend::new(aws_config).await?;
            info!(
                "AWS storage backend initialized: bucket={} region={} prefix='{}'",
                aws_config.bucket, aws_config.region, aws_config.prefix
            );
            Arc::new(backend)
        }
        "memory" => {
            warn!("Memory storage backend selected; it starts empty");
            Arc::new(blobgate::storage::memory::MemoryBackend::new())
        }
        "local" => {
            let root = &config.storage.local.root_dir;
            let backend = blobgate::storage::local::LocalBackend::new(root)?;
            info!("Local storage backend initialized at {}", root);
            Arc::new(backend)
        }
        other => anyhow::bail!("unknown storage.backend '{other}' (expected local, memory or aws)"),
    };
    Ok(storage)
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
