//! Secondary fetch primitive.
//!
//! The pipeline never sees the body of the response it observed, so it
//! issues its own GET for the same URL. [`BodyFetcher`] is the seam; the
//! reqwest-backed [`FetchClient`] is the production implementation.
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 10MB (configurable), checked against Content-Length
//!   before the body is read and against the actual length after.
//! - Non-success statuses are failures; nothing is retried here.

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use std::time::{Duration, Instant};

pub use url::{UrlError, normalize, origin_host};

use cachet_core::config::AppConfig;
use cachet_core::{Error, Validator};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "cachet/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "cachet/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_resource_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// Body and cache metadata returned by a secondary fetch.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub validator: Validator,
    pub bytes: Bytes,
}

/// Anything that can fetch a full response body for a URL.
#[async_trait]
pub trait BodyFetcher: Send + Sync {
    async fn fetch_body(&self, url: &str) -> Result<FetchedBody, Error>;
}

/// HTTP fetch client for secondary body fetches.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

fn header_string(headers: &header::HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::FetchFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn too_large(&self, len: u64) -> Error {
        Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes))
    }
}

#[async_trait]
impl BodyFetcher for FetchClient {
    async fn fetch_body(&self, url: &str) -> Result<FetchedBody, Error> {
        let start = Instant::now();

        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::FetchTimeout(format!("{url}: {e}"))
            } else {
                Error::FetchFailed(format!("network error: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpError(format!("status {}", status.as_u16())));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(self.too_large(len));
        }

        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                Error::FetchTimeout(format!("{url}: {e}"))
            } else {
                Error::FetchFailed(format!("failed to read response: {e}"))
            }
        })?;

        if bytes.len() > self.config.max_bytes {
            return Err(self.too_large(bytes.len() as u64));
        }

        tracing::debug!(url = %url, bytes = bytes.len(), ms = start.elapsed().as_millis() as u64, "secondary fetch complete");

        Ok(FetchedBody {
            status,
            content_type: header_string(&headers, header::CONTENT_TYPE),
            validator: Validator::new(
                header_string(&headers, header::ETAG),
                header_string(&headers, header::LAST_MODIFIED),
            ),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "cachet/0.1");
        assert_eq!(config.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { max_resource_bytes: 1024, timeout_ms: 500, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.max_bytes, 1024);
        assert_eq!(config.timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_header_string() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ETAG, header::HeaderValue::from_static("\"v1\""));
        assert_eq!(header_string(&headers, header::ETAG).as_deref(), Some("\"v1\""));
        assert_eq!(header_string(&headers, header::LAST_MODIFIED), None);
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let client = FetchClient::new(FetchConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_fails() {
        let config = FetchConfig { timeout: Duration::from_millis(500), ..Default::default() };
        let client = FetchClient::new(config).unwrap();
        let result = client.fetch_body("http://127.0.0.1:9/never.js").await;
        assert!(matches!(result, Err(Error::FetchFailed(_)) | Err(Error::FetchTimeout(_))));
    }
}
