use std::time::Duration;

/// Default blob API endpoint when `ARCA_STORE_ENDPOINT` is unset.
pub const DEFAULT_ENDPOINT: &str = "https://api.storacha.network";

/// Configuration for a [`BlobClient`](crate::BlobClient).
///
/// All fields have sensible defaults. Use the builder pattern:
///
/// ```rust
/// use arca_transport::BlobClientConfig;
/// use std::time::Duration;
///
/// let config = BlobClientConfig::new()
///     .endpoint("http://127.0.0.1:8080")
///     .request_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct BlobClientConfig {
    /// Base URL of the blob API.
    pub(crate) endpoint: String,
    /// Bearer token sent with every request. Empty means no auth header.
    pub(crate) token: String,
    /// Per-request timeout enforced by the HTTP client.
    pub(crate) request_timeout: Duration,
    /// Path (relative to the endpoint) of the blob collection.
    pub(crate) data_path: String,
}

impl Default for BlobClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobClientConfig {
    /// Create a new config with defaults.
    ///
    /// `ARCA_STORE_ENDPOINT` and `ARCA_STORE_TOKEN` seed the endpoint and
    /// token when set; the setters below override them.
    pub fn new() -> Self {
        let endpoint = std::env::var("ARCA_STORE_ENDPOINT")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let token = std::env::var("ARCA_STORE_TOKEN").unwrap_or_default();

        Self {
            endpoint,
            token,
            request_timeout: Duration::from_secs(30),
            data_path: "/data".to_string(),
        }
    }

    /// Set the base URL of the blob API.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the bearer token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set the per-request timeout (default: 30 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the blob collection path (default: `/data`).
    pub fn data_path(mut self, path: impl Into<String>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn endpoint_str(&self) -> &str {
        &self.endpoint
    }

    /// Whether a bearer token is configured.
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}
