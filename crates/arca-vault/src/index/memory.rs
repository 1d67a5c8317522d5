use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{IndexEntry, KeyIndex};
use crate::error::VaultError;
use crate::types::ContentAddress;

/// Non-persistent index, for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryKeyIndex {
    entries: Mutex<BTreeMap<String, ContentAddress>>,
}

impl MemoryKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ContentAddress>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait::async_trait]
impl KeyIndex for MemoryKeyIndex {
    async fn put(&self, key: &str, address: &ContentAddress) -> Result<(), VaultError> {
        self.lock().insert(key.to_string(), address.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ContentAddress>, VaultError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn entries_by_prefix(&self, prefix: &str) -> Result<Vec<IndexEntry>, VaultError> {
        Ok(self
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, a)| IndexEntry {
                key: k.clone(),
                address: a.clone(),
            })
            .collect())
    }

    async fn remove(&self, key: &str) -> Result<(), VaultError> {
        self.lock().remove(key);
        Ok(())
    }
}
