//! Prometheus exporter for StageSmarts power distribution units.
//!
//! On every scrape the exporter fetches the current values of the PDU named
//! by the `target` query parameter, decodes the device's JSON document and
//! exposes the readings as gauges.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   PDU HTTP API  │────>│  decode/project │────>│   HTTP Server   │
//! │ (:8080/api/...) │     │   (per scrape)  │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! stagesmarts-exporter --config config.json5
//! curl 'http://127.0.0.1:9005/metrics?target=pdu-01.local'
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod decode;
pub mod exposition;
pub mod http;
pub mod model;
pub mod projection;
pub mod scrape;
pub mod upstream;

pub use config::ExporterConfig;
pub use decode::{DecodeError, DecodeErrorKind};
pub use http::HttpServer;
pub use model::SystemSnapshot;
pub use projection::{MetricFamily, ProjectionError, project};
pub use scrape::{ScrapeError, Scraper};
pub use upstream::{DeviceClient, UpstreamError};
