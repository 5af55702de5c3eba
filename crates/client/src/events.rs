//! Observation feed event types.
//!
//! Events arrive as loosely-typed payloads from the host. They are decoded
//! into a closed set of variants here, and [`Target`] validation rejects
//! anything without a usable URL or origin before it reaches the engine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use cachet_core::{Error, Validator};

use crate::fetch::url::{normalize, origin_host};

fn default_method() -> String {
    "GET".into()
}

/// An outgoing request seen by the host.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RequestObserved {
    /// Request URL as seen on the wire.
    pub url: String,
    /// Hostname (or URL) of the page that issued the request.
    pub origin: String,
    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,
}

/// A completed response seen by the host.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResponseObserved {
    pub url: String,
    pub origin: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub status: u16,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    /// Exact body size when the host knows it.
    #[serde(default)]
    pub content_length: Option<u64>,
    /// Whether a lower-level native cache already satisfied the exchange.
    #[serde(default)]
    pub from_cache: bool,
}

/// Tagged union of everything the observation feed can deliver.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservedEvent {
    Request(RequestObserved),
    Response(ResponseObserved),
}

/// Normalized cache key and owning origin of an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    pub origin_host: String,
}

impl Target {
    pub fn parse(url: &str, origin: &str) -> Result<Self, Error> {
        let url = normalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let origin_host = origin_host(origin).map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self { url: url.into(), origin_host })
    }
}

fn is_get(method: &str) -> bool {
    method.eq_ignore_ascii_case("GET")
}

impl RequestObserved {
    pub fn target(&self) -> Result<Target, Error> {
        Target::parse(&self.url, &self.origin)
    }

    pub fn is_retrieval(&self) -> bool {
        is_get(&self.method)
    }
}

impl ResponseObserved {
    pub fn target(&self) -> Result<Target, Error> {
        Target::parse(&self.url, &self.origin)
    }

    pub fn is_retrieval(&self) -> bool {
        is_get(&self.method)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn validator(&self) -> Validator {
        Validator::new(self.etag.clone(), self.last_modified.clone())
    }
}
