/// Provenance records: who produced a stored artifact, and when.
///
/// One record per write, uploaded as its own blob and indexed under
/// `lineage:<address>`. Records are never updated or deleted here.
/// On the wire the fields are `cid`, `origin`, `creator`, `created_at`,
/// `modified_at` and `type`. Timestamps written here are milliseconds
/// since the epoch. Records from producers that write seconds, or that
/// omit `modified_at` or `type`, still decode, with the timestamps kept
/// as-is.
use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::types::{now_ms, ContentAddress};

/// Index key prefix for lineage entries.
pub const LINEAGE_PREFIX: &str = "lineage:";

/// Index key under which the lineage of `address` is stored.
pub fn lineage_key(address: &ContentAddress) -> String {
    format!("{LINEAGE_PREFIX}{address}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageRecord {
    /// Address of the artifact this record describes.
    #[serde(rename = "cid")]
    pub address: ContentAddress,
    /// Where the data came from, e.g. `memory:documents` or `backup`.
    pub origin: String,
    /// Who produced it.
    pub creator: String,
    #[serde(rename = "created_at")]
    pub created_at_ms: u64,
    /// Zero until the artifact is modified.
    #[serde(rename = "modified_at", default)]
    pub modified_at_ms: u64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl LineageRecord {
    /// New record stamped with the current time.
    pub fn new(
        address: ContentAddress,
        origin: impl Into<String>,
        creator: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            address,
            origin: origin.into(),
            creator: creator.into(),
            created_at_ms: now_ms(),
            modified_at_ms: 0,
            kind: kind.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, VaultError> {
        serde_json::to_vec(self).map_err(Into::into)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, VaultError> {
        serde_json::from_slice(data).map_err(Into::into)
    }
}
