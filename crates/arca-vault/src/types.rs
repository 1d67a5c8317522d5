use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// URI schemes that mark a restore source as a remote content address.
pub const REMOTE_SCHEMES: [&str; 2] = ["ipfs://", "filecoin://"];

/// Opaque identifier returned by a content store on upload.
///
/// Never validated client-side: whatever the store hands back is the address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a remote source like `ipfs://<address>`.
    ///
    /// Returns `None` for anything else (local paths included) and for an
    /// empty address after the scheme.
    pub fn from_uri(source: &str) -> Option<Self> {
        REMOTE_SCHEMES
            .iter()
            .find_map(|scheme| source.strip_prefix(scheme))
            .filter(|rest| !rest.is_empty())
            .map(Self::new)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ContentAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContentAddress {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
