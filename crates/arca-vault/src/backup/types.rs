/// Backup and restore request/result types.
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::EncryptionKey;
use crate::types::ContentAddress;

// ── Constants ────────────────────────────────────────────────────────────

/// Suffix of the manifest written next to every local snapshot.
pub const MANIFEST_SUFFIX: &str = ".manifest.json";

/// Logical key prefix used when a backup request names no key.
pub const BACKUP_KEY_PREFIX: &str = "backup:";

/// Lineage origin used when a backup request names none.
pub const DEFAULT_ORIGIN: &str = "backup";

/// Lineage `type` stamped on backup snapshots.
pub const BACKUP_KIND: &str = "backup";

// ── Requests ─────────────────────────────────────────────────────────────

/// One backup: `payload` goes to the remote store and to a local
/// snapshot at `path`.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub path: PathBuf,
    pub payload: Vec<u8>,
    pub encrypted: bool,
    /// Logical key to index the upload under. Defaults to `backup:<path>`.
    pub key: Option<String>,
    /// Lineage origin. Defaults to [`DEFAULT_ORIGIN`].
    pub origin: Option<String>,
}

impl BackupRequest {
    pub fn new(path: impl Into<PathBuf>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            payload: payload.into(),
            encrypted: false,
            key: None,
            origin: None,
        }
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// The key the upload is indexed and locked under.
    pub fn logical_key(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => format!("{BACKUP_KEY_PREFIX}{}", self.path.display()),
        }
    }
}

/// One restore: fetch `source`, decrypt if needed, write `destination`.
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    /// `ipfs://<address>`, `filecoin://<address>`, or a local snapshot path.
    pub source: String,
    pub destination: PathBuf,
    /// Explicit decryption key. Overrides the manifest and the heuristic.
    pub key: Option<EncryptionKey>,
}

impl RestoreRequest {
    pub fn new(source: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            key: None,
        }
    }

    pub fn key(mut self, key: EncryptionKey) -> Self {
        self.key = Some(key);
        self
    }
}

/// Where a restore reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreSource {
    Remote(ContentAddress),
    Local(PathBuf),
}

impl RestoreSource {
    pub fn parse(source: &str) -> Self {
        match ContentAddress::from_uri(source) {
            Some(address) => RestoreSource::Remote(address),
            None => RestoreSource::Local(PathBuf::from(source)),
        }
    }
}

// ── Manifest ─────────────────────────────────────────────────────────────

/// Outcome of a backup. Failed backups produce one too.
///
/// Serialized (without `data`) as the `<path>.manifest.json` sidecar, so
/// a later restore knows whether the snapshot is encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub path: String,
    pub encrypted: bool,
    /// No compression is applied; always `None`.
    #[serde(default)]
    pub compression_level: Option<u32>,
    /// Stored size in bytes (after encryption).
    #[serde(default)]
    pub size: Option<u64>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<ContentAddress>,
    /// The stored bytes, on success.
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
}

impl BackupManifest {
    /// The failure shape: input echoed back, nothing else.
    pub fn failed(path: &Path, encrypted: bool) -> Self {
        Self {
            path: path.display().to_string(),
            encrypted,
            compression_level: None,
            size: None,
            success: false,
            address: None,
            data: None,
        }
    }
}

/// `<path>.manifest.json`.
pub fn manifest_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(MANIFEST_SUFFIX);
    PathBuf::from(name)
}
