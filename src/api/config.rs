//! REST client configuration

use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

/// Environment variable holding the REST base URL
pub const API_ENDPOINT_ENV: &str = "HTTP_API_ENDPOINT";

/// Records requested per bulk fetch
pub const DEFAULT_PAGE_SIZE: u32 = 5;

/// REST client configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL; always ends with `/` so relative paths join beneath it
    pub base_url: Url,

    /// `limit` of the bulk fetch
    pub page_size: u32,

    pub request_timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: Url) -> Result<Self, ConfigError> {
        match base_url.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }

        Ok(Self {
            base_url: with_trailing_slash(base_url),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
        })
    }

    /// Build a config from `HTTP_API_ENDPOINT`
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var(API_ENDPOINT_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(API_ENDPOINT_ENV))?;
        Self::parse(&raw)
    }

    /// Build a config from a URL string
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        Self::new(url)
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
