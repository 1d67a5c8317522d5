use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;

use super::{IndexEntry, KeyIndex};
use crate::error::VaultError;
use crate::types::ContentAddress;

const EXTENSION: &str = ".entry";

/// Escaped names longer than this are replaced by a hash.
const MAX_ESCAPED_LEN: usize = 200;

/// Prefix of hashed file names. `h` is not a hex digit, so no escaped
/// key can produce it.
const HASHED_PREFIX: &str = "%h-";

/// One JSON file per key under a base directory.
///
/// File names are derived from the key: bytes outside `[A-Za-z0-9_-]`
/// are percent-escaped (`account:1` → `account%3A1.entry`), and very
/// long keys fall back to `%h-<sha256>.entry`. Each file holds the full
/// `{key, address}` record, so hashed entries can still be listed.
///
/// Writes go to a temporary sibling and are renamed into place. Only one
/// process should own a given directory.
#[derive(Debug, Clone)]
pub struct FileKeyIndex {
    dir: PathBuf,
}

impl FileKeyIndex {
    /// Open (creating if needed) an index rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| VaultError::local(&dir, e))?;
        tracing::debug!(dir = %dir.display(), "key index opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(file_name(key))
    }

    async fn read_entry(&self, path: &Path, key_hint: &str) -> Result<Option<IndexEntry>, VaultError> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(VaultError::index(key_hint, e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| VaultError::index(key_hint, io::Error::new(io::ErrorKind::InvalidData, e)))
    }
}

#[async_trait::async_trait]
impl KeyIndex for FileKeyIndex {
    async fn put(&self, key: &str, address: &ContentAddress) -> Result<(), VaultError> {
        let entry = IndexEntry {
            key: key.to_string(),
            address: address.clone(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        crate::fs::write_atomic(&self.entry_path(key), &bytes)
            .await
            .map_err(|e| VaultError::index(key, e))?;
        tracing::debug!(key, address = %address, "index entry written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ContentAddress>, VaultError> {
        let entry = self.read_entry(&self.entry_path(key), key).await?;
        Ok(entry.filter(|e| e.key == key).map(|e| e.address))
    }

    async fn entries_by_prefix(&self, prefix: &str) -> Result<Vec<IndexEntry>, VaultError> {
        let escaped_prefix = escape(prefix);
        let mut dir = fs::read_dir(&self.dir)
            .await
            .map_err(|e| VaultError::index(prefix, e))?;

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await.map_err(|e| VaultError::index(prefix, e))? {
            let name = item.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(EXTENSION) else { continue };
            if crate::fs::is_temp_name(name) {
                continue;
            }
            // Escaping maps bytes one-to-one, so prefixes survive it.
            let hashed = stem.starts_with(HASHED_PREFIX);
            if !hashed && !stem.starts_with(&escaped_prefix) {
                continue;
            }
            // A concurrent remove may win the race; treat as absent.
            if let Some(entry) = self.read_entry(&item.path(), prefix).await? {
                if entry.key.starts_with(prefix) {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    async fn remove(&self, key: &str) -> Result<(), VaultError> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => {
                tracing::debug!(key, "index entry removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::index(key, e)),
        }
    }
}

fn escape(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn file_name(key: &str) -> String {
    let escaped = escape(key);
    if escaped.len() > MAX_ESCAPED_LEN {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        format!("{HASHED_PREFIX}{digest}{EXTENSION}")
    } else {
        format!("{escaped}{EXTENSION}")
    }
}
