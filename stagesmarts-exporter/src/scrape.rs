//! One scrape: fetch, decode, project, render.

use thiserror::Error;
use tracing::debug;

use crate::decode::DecodeError;
use crate::exposition;
use crate::model::SystemSnapshot;
use crate::projection::{MetricFamily, ProjectionError, project};
use crate::upstream::{DeviceClient, UpstreamError};

/// Reasons a scrape produced no metrics.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] std::fmt::Error),
}

/// Decode a response body and project it, all or nothing.
pub fn families_from_slice(raw: &[u8]) -> Result<Vec<MetricFamily>, ScrapeError> {
    let snapshot = SystemSnapshot::from_slice(raw)?;
    Ok(project(&snapshot)?)
}

/// Scrapes devices through a shared [`DeviceClient`].
///
/// Holds no metric state: every call builds and renders its own registry.
#[derive(Debug, Clone)]
pub struct Scraper {
    client: DeviceClient,
}

impl Scraper {
    pub fn new(client: DeviceClient) -> Self {
        Self { client }
    }

    /// Scrape `target` and return the exposition body.
    pub async fn scrape(&self, target: &str) -> Result<String, ScrapeError> {
        let raw = self.client.fetch(target).await?;
        let families = families_from_slice(&raw)?;
        let body = exposition::render(&families)?;

        debug!(
            device = %target,
            families = families.len(),
            bytes = raw.len(),
            "Scrape complete"
        );

        Ok(body)
    }
}
