mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};
use yfgate_core::{
    CacheStore, MultiWindowLimiter, ReqwestHttpClient, ServiceConfig, UpstreamSession,
    YahooClient,
};
use yfgate_web::{router, AppState};

use crate::cli::Cli;

#[derive(Debug, Error)]
enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "yfgate stopped");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` controls verbosity; defaults to `info`.
fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();
}

async fn run() -> Result<(), ServerError> {
    let cli = Cli::parse();
    let mut config = ServiceConfig::from_env();
    cli.apply(&mut config);

    // A zero TTL yields a disabled cache.
    let session = Arc::new(UpstreamSession::new(
        Arc::new(ReqwestHttpClient::new()),
        CacheStore::new(config.cache_ttl),
        MultiWindowLimiter::new(config.rate_limits),
    ));
    let source = Arc::new(YahooClient::from_config(&config, session.clone()));
    let app = router(AppState::new(source, session));

    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind,
            source,
        })?;
    info!(
        addr = %config.bind,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        per_second = config.rate_limits.per_second,
        per_minute = config.rate_limits.per_minute,
        per_hour = config.rate_limits.per_hour,
        "yfgate listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
