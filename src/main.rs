use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use preview_bot::config::{AppConfig, LogFormat};
use preview_bot::server::{create_router, AppState};
use preview_bot::shutdown::{drain_actions, grace_period, wait_for_shutdown};

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "preview-bot", about = "Per-pull-request preview deployments")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log output format (overrides logging.format)
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Configuration errors are fatal: refuse to serve without a secret and a usable key.
    let config = AppConfig::load(cli.config.as_deref())?;

    let format = match cli.log_format {
        Some(LogFormatArg::Json) => LogFormat::Json,
        Some(LogFormatArg::Text) => LogFormat::Text,
        None => config.logging.format,
    };
    init_tracing(format);

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        app_id = config.github.app_id,
        "Starting preview-bot"
    );

    let state = Arc::new(AppState::new(config.clone())?);

    let app = create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        config.server.host, config.server.port
    ))
    .await?;

    tracing::info!("Listening on {}", listener.local_addr()?);

    // Run server with graceful shutdown; in-flight actions get a bounded grace period.
    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(None);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        wait_for_shutdown().await;
        let _ = shutdown_tx.send(Some(Instant::now() + grace));
    });

    let in_flight = tokio::select! {
        result = server.into_future() => {
            result?;
            // Actions whose sender disconnected may still be running.
            let deadline = (*shutdown_rx.borrow()).unwrap_or_else(Instant::now);
            drain_actions(&state, deadline).await
        }
        in_flight = grace_period(shutdown_rx.clone(), Arc::clone(&state)) => in_flight,
    };

    if in_flight > 0 {
        tracing::warn!(
            count = in_flight,
            "Shutdown grace period elapsed with deployments still running"
        );
    } else {
        tracing::info!("Shutdown complete");
    }

    Ok(())
}
