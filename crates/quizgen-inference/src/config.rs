//! Gateway connection settings.

use quizgen_core::defaults::{GATEWAY_QUALITY, GATEWAY_TIMEOUT_SECS, GATEWAY_URL};

/// Configuration for the AI gateway client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base URL, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
    /// Bearer token; omitted from requests when `None`.
    pub api_key: Option<String>,
    /// Quality tier sent with every call (`fast`, `balanced`, `best`).
    pub quality: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: GATEWAY_URL.to_string(),
            api_key: None,
            quality: GATEWAY_QUALITY.to_string(),
            timeout_seconds: GATEWAY_TIMEOUT_SECS,
        }
    }
}

impl GatewayConfig {
    /// Load from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `QUIZGEN_GATEWAY_URL` | `http://127.0.0.1:8000` |
    /// | `QUIZGEN_GATEWAY_API_KEY` | (none) |
    /// | `QUIZGEN_GATEWAY_QUALITY` | `balanced` |
    /// | `QUIZGEN_GATEWAY_TIMEOUT_SECS` | 180 |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("QUIZGEN_GATEWAY_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("QUIZGEN_GATEWAY_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            quality: std::env::var("QUIZGEN_GATEWAY_QUALITY")
                .map(|q| q.trim().to_lowercase())
                .unwrap_or(defaults.quality),
            timeout_seconds: std::env::var("QUIZGEN_GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn with_timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.quality, "balanced");
        assert_eq!(config.timeout_seconds, 180);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_builders() {
        let config = GatewayConfig::default()
            .with_base_url("http://gateway:9000")
            .with_api_key("secret")
            .with_quality("best")
            .with_timeout_seconds(30);
        assert_eq!(config.base_url, "http://gateway:9000");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.quality, "best");
        assert_eq!(config.timeout_seconds, 30);
    }
}
