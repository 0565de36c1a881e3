//! Configuration for harvest runs.
//!
//! This module provides [`HarvestConfig`], which names the remote OAI-PMH
//! handlers and controls request and retry behaviour. It can be built in code
//! with the `with_*` builders or loaded from TOML:
//!
//! ```toml
//! page_retry_limit = 3
//! request_timeout_secs = 60
//!
//! [[handlers]]
//! name = "repoX"
//! base_url = "https://repo.example.org/oai"
//! metadata_prefix = "oai_cerif_openaire"
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};
use crate::model::UserId;

/// Metadata prefix of the OpenAIRE CERIF profile.
pub const CERIF_OPENAIRE_PREFIX: &str = "oai_cerif_openaire";

/// A named remote OAI-PMH endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Name used by schedulers and operators to refer to the endpoint.
    pub name: String,
    /// Base URL the OAI verbs are appended to.
    pub base_url: String,
    /// Metadata prefix used when a job does not name one.
    #[serde(default)]
    pub metadata_prefix: Option<String>,
}

impl HandlerConfig {
    /// Creates a handler entry.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            metadata_prefix: None,
        }
    }

    /// Sets the default metadata prefix for this handler.
    #[must_use]
    pub fn with_metadata_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metadata_prefix = Some(prefix.into());
        self
    }
}

/// Configuration for the protocol client and harvest runs.
///
/// # Examples
///
/// ```ignore
/// use cerif_harvest::config::{HandlerConfig, HarvestConfig};
///
/// let config = HarvestConfig::new()
///     .with_handler(HandlerConfig::new("repoX", "https://repo.example.org/oai"))
///     .with_page_retry_limit(3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Configured handlers.
    pub handlers: Vec<HandlerConfig>,

    // === Transport ===
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// User agent sent with every request.
    pub user_agent: String,

    // === Run behaviour ===
    /// How many times a failed page is re-requested before the run aborts.
    pub page_retry_limit: u32,
    /// Metadata prefix used when neither the job nor the handler names one.
    pub default_metadata_prefix: String,
    /// User recorded as importer when a job does not name one.
    pub default_user: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            request_timeout_secs: 30,
            user_agent: format!("cerif-harvest/{}", env!("CARGO_PKG_VERSION")),
            page_retry_limit: 2,
            default_metadata_prefix: CERIF_OPENAIRE_PREFIX.to_string(),
            default_user: 0,
        }
    }
}

impl HarvestConfig {
    /// Creates a configuration with default values and no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Config`] for invalid TOML or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| HarvestError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the file cannot be read, and the
    /// [`from_toml_str`](Self::from_toml_str) errors otherwise.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks handler names are unique and non-empty and base URLs are HTTP(S).
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for handler in &self.handlers {
            if handler.name.trim().is_empty() {
                return Err(HarvestError::Config("handler with empty name".to_string()));
            }
            if !seen.insert(handler.name.as_str()) {
                return Err(HarvestError::Config(format!(
                    "duplicate handler '{}'",
                    handler.name
                )));
            }
            if !(handler.base_url.starts_with("http://") || handler.base_url.starts_with("https://")) {
                return Err(HarvestError::Config(format!(
                    "handler '{}' has a non-HTTP base URL '{}'",
                    handler.name, handler.base_url
                )));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(HarvestError::Config("request timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Looks up a handler by name.
    #[must_use]
    pub fn handler(&self, name: &str) -> Option<&HandlerConfig> {
        self.handlers.iter().find(|h| h.name == name)
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Default importing user.
    #[must_use]
    pub fn default_user(&self) -> UserId {
        UserId(self.default_user)
    }

    /// Adds a handler.
    #[must_use]
    pub fn with_handler(mut self, handler: HandlerConfig) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Sets the page retry limit.
    #[must_use]
    pub const fn with_page_retry_limit(mut self, limit: u32) -> Self {
        self.page_retry_limit = limit;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
