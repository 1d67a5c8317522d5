use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::backup::DEFAULT_CREATOR;
use crate::breaker::BreakerConfig;
use crate::crypto::{CryptoCodec, PLACEHOLDER_KEY_HEX};
use crate::error::{CryptoError, VaultError};

/// Default index directory when `ARCA_INDEX_DIR` is unset.
pub const DEFAULT_INDEX_DIR: &str = "./backup";

/// Default per-call timeout for remote store operations.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Vault wiring configuration.
///
/// ```rust
/// use arca_vault::VaultConfig;
/// use std::time::Duration;
///
/// let config = VaultConfig::default()
///     .index_dir("/var/lib/arca/index")
///     .call_timeout(Duration::from_secs(10));
/// assert!(config.uses_placeholder_key());
/// ```
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Directory of the file-per-key index.
    pub index_dir: PathBuf,
    /// Hex-encoded AES-256 key. `None` falls back to the placeholder key.
    pub encryption_key_hex: Option<String>,
    /// Upper bound on every remote store call.
    pub call_timeout: Duration,
    pub breaker: BreakerConfig,
    /// Creator stamped into backup lineage records.
    pub creator: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            encryption_key_hex: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            breaker: BreakerConfig::default(),
            creator: DEFAULT_CREATOR.to_string(),
        }
    }
}

impl VaultConfig {
    /// Defaults overridden by `ARCA_*` environment variables.
    ///
    /// Reads `ARCA_INDEX_DIR`, `ARCA_ENCRYPTION_KEY`, `ARCA_CALL_TIMEOUT_MS`,
    /// `ARCA_BREAKER_THRESHOLD`, `ARCA_BREAKER_RESET_MS`,
    /// `ARCA_BREAKER_HALF_OPEN` and `ARCA_CREATOR`. Unset or empty
    /// variables keep the default; unparseable numbers and zero breaker
    /// counts are an error.
    pub fn from_env() -> Result<Self, VaultError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`VaultConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, VaultError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = var("ARCA_INDEX_DIR") {
            config.index_dir = PathBuf::from(dir);
        }
        config.encryption_key_hex = var("ARCA_ENCRYPTION_KEY");
        if let Some(ms) = var("ARCA_CALL_TIMEOUT_MS") {
            config.call_timeout = Duration::from_millis(parse("ARCA_CALL_TIMEOUT_MS", &ms)?);
        }
        if let Some(n) = var("ARCA_BREAKER_THRESHOLD") {
            config.breaker.failure_threshold = parse("ARCA_BREAKER_THRESHOLD", &n)?;
        }
        if let Some(ms) = var("ARCA_BREAKER_RESET_MS") {
            config.breaker.reset_timeout = Duration::from_millis(parse("ARCA_BREAKER_RESET_MS", &ms)?);
        }
        if let Some(n) = var("ARCA_BREAKER_HALF_OPEN") {
            config.breaker.half_open_max_attempts = parse("ARCA_BREAKER_HALF_OPEN", &n)?;
        }
        if let Some(creator) = var("ARCA_CREATOR") {
            config.creator = creator;
        }
        config.breaker.validate()?;
        Ok(config)
    }

    pub fn index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.index_dir = dir.into();
        self
    }

    pub fn encryption_key_hex(mut self, key: impl Into<String>) -> Self {
        self.encryption_key_hex = Some(key.into());
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// Whether the fixed, public fallback key would be used.
    pub fn uses_placeholder_key(&self) -> bool {
        match &self.encryption_key_hex {
            None => true,
            Some(hex_key) => hex_key.trim().eq_ignore_ascii_case(PLACEHOLDER_KEY_HEX),
        }
    }

    /// Build the codec. Fails fast on a malformed key.
    pub fn codec(&self) -> Result<CryptoCodec, CryptoError> {
        match &self.encryption_key_hex {
            Some(hex_key) => CryptoCodec::from_hex(hex_key),
            None => Ok(CryptoCodec::with_placeholder_key()),
        }
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T, VaultError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| VaultError::Config(format!("{name}={value:?}: {e}")))
}
