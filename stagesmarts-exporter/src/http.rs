//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::exposition;
use crate::scrape::{ScrapeError, Scraper};
use crate::upstream::UpstreamError;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    scraper: Arc<Scraper>,
}

/// Query parameters of the metrics endpoint.
#[derive(Debug, Deserialize)]
struct ScrapeParams {
    target: Option<String>,
}

/// Create the HTTP router.
pub fn create_router(scraper: Arc<Scraper>, metrics_path: &str) -> Router {
    let state = AppState { scraper };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn plain_text(status: StatusCode, body: &'static str) -> Response {
    (status, [(CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

/// Handler for the metrics endpoint, `?target=<host>`.
async fn metrics_handler(
    State(state): State<AppState>,
    Query(params): Query<ScrapeParams>,
) -> Response {
    let Some(target) = params.target.filter(|t| !t.is_empty()) else {
        return plain_text(StatusCode::BAD_REQUEST, "Missing parameter 'target'!");
    };

    match state.scraper.scrape(&target).await {
        Ok(body) => {
            (StatusCode::OK, [(CONTENT_TYPE, exposition::CONTENT_TYPE)], body).into_response()
        }
        Err(ScrapeError::Upstream(UpstreamError::InvalidTarget(_))) => {
            plain_text(StatusCode::BAD_REQUEST, "Invalid parameter 'target'!")
        }
        Err(ScrapeError::Upstream(e @ UpstreamError::Unreachable { .. })) => {
            // Target down: answer with an empty scrape instead of a server error
            info!(device = %target, error = %e, "PDU unreachable");
            StatusCode::OK.into_response()
        }
        Err(e) => {
            error!(device = %target, error = %e, "Error while scraping PDU");
            plain_text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// HTTP server configuration.
pub struct HttpServer {
    scraper: Arc<Scraper>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(scraper: Arc<Scraper>, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            scraper,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.scraper, &self.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "Start listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
