//! HTTP transport behind the protocol client.
//!
//! The client only needs "GET this URL with these query parameters and give me
//! the body". [`Transport`] is that seam: [`HttpTransport`] implements it with
//! a blocking `reqwest` client, and tests substitute canned responses.

use std::sync::Arc;

use thiserror::Error;

use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};

/// Failure to obtain a response body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// HTTP status, when the server answered.
    pub status: Option<u16>,
    /// Description of the failure.
    pub message: String,
}

impl TransportError {
    /// A failure without an HTTP status (connection, timeout).
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

/// Response body or transport failure.
pub type FetchResult = std::result::Result<String, TransportError>;

/// Issues GET requests against an OAI-PMH base URL.
pub trait Transport: Send + Sync {
    /// Fetches `base_url` with `params` as the query string and returns the body.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] for network failures, timeouts and non-2xx
    /// responses.
    fn fetch(&self, base_url: &str, params: &[(&'static str, String)]) -> FetchResult;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn fetch(&self, base_url: &str, params: &[(&'static str, String)]) -> FetchResult {
        (**self).fetch(base_url, params)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn fetch(&self, base_url: &str, params: &[(&'static str, String)]) -> FetchResult {
        (**self).fetch(base_url, params)
    }
}

/// [`Transport`] over a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Builds a client with the configured timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Config`] when the TLS backend cannot be initialised.
    pub fn from_config(config: &HarvestConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HarvestError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, base_url: &str, params: &[(&'static str, String)]) -> FetchResult {
        let response = self
            .client
            .get(base_url)
            .query(params)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::new(format!("request timed out: {e}"))
                } else {
                    TransportError::new(format!("request failed: {e}"))
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError {
                status: Some(status.as_u16()),
                message: format!("HTTP status {status}"),
            });
        }
        response
            .text()
            .map_err(|e| TransportError::new(format!("cannot read response body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_builds_from_default_config() {
        assert!(HttpTransport::from_config(&HarvestConfig::default()).is_ok());
    }

    #[test]
    fn test_unreachable_host_is_transport_error() {
        let transport = HttpTransport::from_config(
            &HarvestConfig::default().with_request_timeout(std::time::Duration::from_secs(1)),
        )
        .unwrap();
        let err = transport
            .fetch("http://127.0.0.1:9/oai", &[("verb", "Identify".to_string())])
            .unwrap_err();
        assert_eq!(err.status, None);
    }
}
