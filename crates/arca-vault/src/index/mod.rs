/// Logical key → content address index.
///
/// One current address per key, last write wins, no history. `get` on a
/// key that was never written (or was removed) is `Ok(None)`; only real
/// I/O failures are errors. Listing order is unspecified.
mod file;
mod memory;

pub use file::FileKeyIndex;
pub use memory::MemoryKeyIndex;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::types::ContentAddress;

/// One persisted mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: String,
    pub address: ContentAddress,
}

#[async_trait::async_trait]
pub trait KeyIndex: Send + Sync {
    /// Map `key` to `address`, replacing any previous mapping.
    async fn put(&self, key: &str, address: &ContentAddress) -> Result<(), VaultError>;

    async fn get(&self, key: &str) -> Result<Option<ContentAddress>, VaultError>;

    /// All entries whose key starts with `prefix`, in no particular order.
    async fn entries_by_prefix(&self, prefix: &str) -> Result<Vec<IndexEntry>, VaultError>;

    /// Drop the mapping for `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), VaultError>;

    /// Addresses of all keys starting with `prefix`, in no particular order.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ContentAddress>, VaultError> {
        let entries = self.entries_by_prefix(prefix).await?;
        Ok(entries.into_iter().map(|e| e.address).collect())
    }
}
