//! Client configuration.
//!
//! All client behaviour is controlled through [`ClientConfig`], built via its
//! [`ClientConfigBuilder`]. The builder lets callers set only what they care
//! about and rely on documented defaults for the rest.

use crate::error::ForgeError;
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

/// Default service address (the server's own `uvicorn` default).
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8001";

/// Configuration for a [`crate::auth::ForgeClient`].
///
/// # Example
/// ```rust
/// use fileforge::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::builder()
///     .base_url("http://localhost:9000")
///     .completed_hold(Duration::ZERO)
///     .build()
///     .unwrap();
/// assert_eq!(config.base_url.as_str(), "http://localhost:9000/");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root URL of the service; endpoint paths are joined onto it.
    pub base_url: Url,

    /// Credential that takes precedence over the persisted one. Not written
    /// back to the credential file.
    pub api_key: Option<String>,

    /// Where the persisted credential lives. `None` keeps it in memory only.
    pub credentials_path: Option<PathBuf>,

    /// How long completed step states stay visible after a workflow's
    /// `complete` event before they are cleared. Default: 3 s.
    pub completed_hold: Duration,

    /// JPEG quality for explicit HEIC conversions. Default: 95.
    pub heic_quality: u8,

    /// JPEG quality for crop previews of HEIC images. Default: 80.
    pub preview_quality: u8,

    /// Per-request timeout. `None` leaves it to the transport default.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            api_key: None,
            credentials_path: default_credentials_path(),
            completed_hold: Duration::from_secs(3),
            heic_quality: 95,
            preview_quality: 80,
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
            base_url: None,
        }
    }
}

/// `<config dir>/fileforge/credentials.json`, when the platform has one.
pub fn default_credentials_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fileforge").join("credentials.json"))
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
    base_url: Option<String>,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.credentials_path = Some(path.into());
        self
    }

    /// Keep the credential in memory only.
    pub fn no_credentials_file(mut self) -> Self {
        self.config.credentials_path = None;
        self
    }

    pub fn completed_hold(mut self, hold: Duration) -> Self {
        self.config.completed_hold = hold;
        self
    }

    pub fn heic_quality(mut self, q: u8) -> Self {
        self.config.heic_quality = q;
        self
    }

    pub fn preview_quality(mut self, q: u8) -> Self {
        self.config.preview_quality = q;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<ClientConfig, ForgeError> {
        if let Some(raw) = self.base_url.take() {
            let mut url = Url::parse(&raw)
                .map_err(|e| ForgeError::InvalidConfig(format!("base URL '{raw}': {e}")))?;
            // Endpoint paths are joined relative to the base.
            if !url.path().ends_with('/') {
                let path = format!("{}/", url.path());
                url.set_path(&path);
            }
            self.config.base_url = url;
        }
        let c = &self.config;
        if !matches!(c.base_url.scheme(), "http" | "https") {
            return Err(ForgeError::InvalidConfig(format!(
                "base URL must be http or https, got '{}'",
                c.base_url.scheme()
            )));
        }
        if c.base_url.cannot_be_a_base() {
            return Err(ForgeError::InvalidConfig(format!(
                "base URL '{}' cannot carry paths",
                c.base_url
            )));
        }
        for (name, q) in [("heic", c.heic_quality), ("preview", c.preview_quality)] {
            if !(1..=100).contains(&q) {
                return Err(ForgeError::InvalidConfig(format!(
                    "{name} quality must be 1–100, got {q}"
                )));
            }
        }
        Ok(self.config)
    }
}
