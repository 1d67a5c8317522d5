use std::time::Duration;

/// Errors returned by the Arca transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {endpoint} failed: {source}")]
    Unavailable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("{endpoint} answered with HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed response: {reason}")]
    Protocol { reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TransportError {
    /// True when the remote never produced a usable answer (network, timeout, HTTP status).
    ///
    /// `Protocol` and `Config` are not transient: retrying the same request
    /// will not fix a missing field or a bad endpoint.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            TransportError::Unavailable { .. }
                | TransportError::Timeout { .. }
                | TransportError::Status { .. }
        )
    }

    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        TransportError::Protocol {
            reason: reason.into(),
        }
    }
}
