//! Prometheus exporter for StageSmarts PDUs.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use stagesmarts_exporter::config::LogFormat;
use stagesmarts_exporter::{DeviceClient, ExporterConfig, HttpServer, Scraper};

/// Prometheus exporter for StageSmarts PDUs.
#[derive(Parser, Debug)]
#[command(name = "stagesmarts-exporter")]
#[command(about = "Export StageSmarts PDU values as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// Address the webserver listens on (overrides config).
    #[arg(long)]
    listen_address: Option<String>,

    /// Port the webserver binds to (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    // CLI overrides
    if let Some(listen_address) = args.listen_address {
        config.server.listen_address = listen_address;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    // Initialize logging
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.logging.level)
        .parse()
        .unwrap_or(Level::INFO);
    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), log_level)?;

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    info!("Starting StageSmarts exporter");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let client = DeviceClient::new(&config.upstream)
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
    let scraper = Arc::new(Scraper::new(client));

    let http_server = HttpServer::new(
        scraper,
        config.server.socket_addr()?,
        config.server.path.clone(),
    );

    let mut http_task = tokio::spawn(http_server.run(shutdown_rx));

    // Wait for shutdown signal, or for the server to stop on its own
    tokio::select! {
        result = &mut http_task => {
            let result = result?;
            if let Err(e) = &result {
                error!("HTTP server error: {}", e);
            }
            return result;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    let _ = shutdown_tx.send(true);

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    info!("Exporter stopped");
    Ok(())
}

/// Build the log filter. `RUST_LOG`, when set, replaces the configured level.
fn log_filter(rust_log: Option<String>, level: Level) -> anyhow::Result<EnvFilter> {
    let filter = match rust_log {
        Some(directives) => EnvFilter::builder().parse_lossy(directives),
        None => EnvFilter::default()
            .add_directive(format!("stagesmarts_exporter={}", level).parse()?)
            .add_directive(format!("reqwest={}", Level::WARN).parse()?),
    };
    Ok(filter)
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
