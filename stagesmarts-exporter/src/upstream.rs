//! Client for the PDU's HTTP API.

use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tracing::trace;

use crate::config::UpstreamConfig;

/// Errors fetching the current values from a device.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The target parameter is not a bare host name or address.
    #[error("invalid target {0:?}")]
    InvalidTarget(String),

    /// The device could not be reached in time, usually because it is down.
    #[error("target {target} unreachable: {source}")]
    Unreachable {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    /// The device answered with a non-success status.
    #[error("target {target} answered with status {status}")]
    Status { target: String, status: StatusCode },

    /// Any other failure while talking to the device.
    #[error("failed to read response from {target}: {source}")]
    Transport {
        target: String,
        #[source]
        source: reqwest::Error,
    },
}

impl UpstreamError {
    fn from_reqwest(target: &str, source: reqwest::Error) -> Self {
        let target = target.to_string();
        if source.is_timeout() || source.is_connect() {
            Self::Unreachable { target, source }
        } else {
            Self::Transport { target, source }
        }
    }
}

/// Fetches `getcurrentpduvalues` from devices on the configured port.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    client: Client,
    port: u16,
    path: String,
}

impl DeviceClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            client,
            port: config.port,
            path: config.path.clone(),
        })
    }

    /// URL of the values endpoint on `target`.
    ///
    /// `target` must be a host name or IP address without port, IPv6
    /// addresses may be given with or without brackets.
    pub fn url_for(&self, target: &str) -> Result<Url, UpstreamError> {
        let invalid = || UpstreamError::InvalidTarget(target.to_string());

        let valid_chars = target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']'));
        if target.is_empty() || !valid_chars {
            return Err(invalid());
        }

        let host = match target.parse::<std::net::Ipv6Addr>() {
            Ok(address) => format!("[{}]", address),
            Err(_) if target.contains(':') && !target.starts_with('[') => return Err(invalid()),
            Err(_) => target.to_string(),
        };

        Url::parse(&format!("http://{}:{}{}", host, self.port, self.path)).map_err(|_| invalid())
    }

    /// Fetch the raw response body from `target`.
    pub async fn fetch(&self, target: &str) -> Result<Vec<u8>, UpstreamError> {
        let url = self.url_for(target)?;
        trace!(url = %url, "Requesting PDU values");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(target, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                target: target.to_string(),
                status,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_reqwest(target, e))?;

        Ok(body.to_vec())
    }
}
