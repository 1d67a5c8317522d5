use std::path::PathBuf;

/// Errors raised by the encryption codec.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption key must be {expected} bytes (got {got} bytes)")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("encryption key is not valid hex: {0}")]
    InvalidKeyEncoding(String),

    #[error("invalid ciphertext: {len} bytes is too short to contain an IV")]
    InvalidCiphertext { len: usize },

    #[error("cipher failure: {0}")]
    Cipher(String),
}

/// Vault-level errors.
///
/// Storage failures are split into `StorageUnavailable` (transport,
/// timeout, HTTP status) and `StorageProtocol` (the remote answered
/// without the expected field), so callers and the circuit breaker can
/// tell a degraded remote from a broken one.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("encryption error: {0}")]
    Encryption(#[from] CryptoError),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("storage protocol error: {0}")]
    StorageProtocol(String),

    #[error("index unavailable for {key}: {source}")]
    IndexUnavailable {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("circuit open: {operation} rejected")]
    CircuitOpen { operation: String },

    #[error("{0} is not implemented by this store")]
    Unimplemented(&'static str),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("local file {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl VaultError {
    pub(crate) fn index(key: impl Into<String>, source: std::io::Error) -> Self {
        VaultError::IndexUnavailable {
            key: key.into(),
            source,
        }
    }

    pub(crate) fn local(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VaultError::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// True for the breaker's fast-fail rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, VaultError::CircuitOpen { .. })
    }
}

impl From<arca_transport::TransportError> for VaultError {
    fn from(e: arca_transport::TransportError) -> Self {
        match e {
            arca_transport::TransportError::Config(reason) => VaultError::Config(reason),
            e if e.is_unavailable() => VaultError::StorageUnavailable(e.to_string()),
            e => VaultError::StorageProtocol(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}
