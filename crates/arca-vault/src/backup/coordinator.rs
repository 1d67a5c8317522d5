/// BackupCoordinator: encrypt → store → index, and locate → fetch →
/// decrypt → deliver.
///
/// Owns no persistent state: it composes the codec, the guarded store and
/// the key index per call. Ordinary failures are downgraded into the
/// result (`success = false` / `false`) and logged; only malformed input
/// and codec failures are returned as errors.
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::backup::types::*;
use crate::crypto::{CryptoCodec, EncryptionKey, IV_LEN};
use crate::error::VaultError;
use crate::index::KeyIndex;
use crate::lineage::{lineage_key, LineageRecord};
use crate::locks::KeyLocks;
use crate::store::GuardedStore;
use crate::types::ContentAddress;

/// Default lineage creator.
pub const DEFAULT_CREATOR: &str = "arca";

pub struct BackupCoordinator {
    codec: CryptoCodec,
    store: Arc<GuardedStore>,
    index: Arc<dyn KeyIndex>,
    locks: Arc<KeyLocks>,
    snapshot_locks: KeyLocks,
    creator: String,
}

impl BackupCoordinator {
    pub fn new(codec: CryptoCodec, store: Arc<GuardedStore>, index: Arc<dyn KeyIndex>) -> Self {
        Self {
            codec,
            store,
            index,
            locks: Arc::new(KeyLocks::new()),
            snapshot_locks: KeyLocks::new(),
            creator: DEFAULT_CREATOR.to_string(),
        }
    }

    /// Share write locks with other writers of the same index.
    pub fn with_locks(mut self, locks: Arc<KeyLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    pub fn store(&self) -> &GuardedStore {
        &self.store
    }

    pub fn index(&self) -> &dyn KeyIndex {
        self.index.as_ref()
    }

    // ── Backup ───────────────────────────────────────────────────────────

    /// Back up `req.payload`.
    ///
    /// Returns `Err` only for an empty path or a codec failure. Storage,
    /// index and local write failures yield `success = false` with the
    /// input path and flag echoed back.
    pub async fn backup(&self, req: BackupRequest) -> Result<BackupManifest, VaultError> {
        if req.path.as_os_str().is_empty() {
            return Err(VaultError::InvalidRequest("backup path is empty".into()));
        }
        let stored = if req.encrypted {
            self.codec.encrypt(&req.payload)?
        } else {
            req.payload.clone()
        };

        match self.try_backup(&req, stored).await {
            Ok(manifest) => {
                tracing::info!(
                    path = %req.path.display(),
                    address = ?manifest.address,
                    size = ?manifest.size,
                    encrypted = req.encrypted,
                    "backup complete"
                );
                Ok(manifest)
            }
            Err(e) => {
                tracing::warn!(path = %req.path.display(), error = %e, "backup failed");
                Ok(BackupManifest::failed(&req.path, req.encrypted))
            }
        }
    }

    /// Runs entirely under the logical key's lock and then the snapshot
    /// path's lock, in that order, so the index entry, the snapshot and its
    /// sidecar always describe the same write.
    async fn try_backup(&self, req: &BackupRequest, stored: Vec<u8>) -> Result<BackupManifest, VaultError> {
        let key = req.logical_key();
        let _key_guard = self.locks.lock(&key).await;
        let _snapshot_guard = self.lock_snapshot(&req.path).await;

        let address = self.store.upload(&key, &stored).await?;
        self.index.put(&key, &address).await?;

        let origin = req.origin.as_deref().unwrap_or(DEFAULT_ORIGIN);
        self.record_lineage(&address, origin).await?;

        let manifest = BackupManifest {
            path: req.path.display().to_string(),
            encrypted: req.encrypted,
            compression_level: None,
            size: Some(stored.len() as u64),
            success: true,
            address: Some(address),
            data: None,
        };
        let sidecar = manifest_path(&req.path);
        crate::fs::write_atomic_pair(&req.path, &stored, &sidecar, &serde_json::to_vec_pretty(&manifest)?)
            .await
            .map_err(|e| VaultError::local(&req.path, e))?;

        Ok(BackupManifest {
            data: Some(stored),
            ..manifest
        })
    }

    async fn lock_snapshot(&self, path: &Path) -> crate::locks::KeyGuard {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        self.snapshot_locks.lock(&absolute.to_string_lossy()).await
    }

    async fn record_lineage(&self, address: &ContentAddress, origin: &str) -> Result<(), VaultError> {
        let record = LineageRecord::new(address.clone(), origin, self.creator.as_str(), BACKUP_KIND);
        let sealed = self.codec.encrypt(&record.to_bytes()?)?;
        let key = lineage_key(address);
        let lineage_address = self.store.upload(&key, &sealed).await?;
        self.index.put(&key, &lineage_address).await
    }

    // ── Restore ──────────────────────────────────────────────────────────

    /// Restore `req.source` to `req.destination`. Returns `true` on full
    /// success; on failure nothing is left at the destination.
    pub async fn restore(&self, req: RestoreRequest) -> bool {
        match self.try_restore(&req).await {
            Ok(bytes) => {
                tracing::info!(
                    source = %req.source,
                    destination = %req.destination.display(),
                    bytes,
                    "restore complete"
                );
                true
            }
            Err(e) => {
                tracing::warn!(source = %req.source, error = %e, "restore failed");
                false
            }
        }
    }

    async fn try_restore(&self, req: &RestoreRequest) -> Result<usize, VaultError> {
        let (fetched, encrypted) = match RestoreSource::parse(&req.source) {
            RestoreSource::Remote(address) => {
                let label = format!("restore({address})");
                (self.store.download(&label, &address).await?, None)
            }
            RestoreSource::Local(path) => {
                let _snapshot_guard = self.lock_snapshot(&path).await;
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| VaultError::local(&path, e))?;
                (bytes, read_manifest(&path).await?.map(|m| m.encrypted))
            }
        };

        let plain = self.unseal(&req.source, fetched, encrypted, req.key.as_ref())?;

        crate::fs::write_atomic(&req.destination, &plain)
            .await
            .map_err(|e| VaultError::local(&req.destination, e))?;
        Ok(plain.len())
    }

    /// Decide whether and how to decrypt restored bytes.
    ///
    /// An explicit key always wins. Otherwise the manifest's flag is
    /// trusted. Without a manifest, anything longer than an IV is assumed
    /// to be encrypted under the codec key, which can misfire on
    /// plaintext input.
    fn unseal(
        &self,
        source: &str,
        bytes: Vec<u8>,
        encrypted: Option<bool>,
        key: Option<&EncryptionKey>,
    ) -> Result<Vec<u8>, VaultError> {
        if let Some(key) = key {
            return Ok(self.codec.decrypt_with(&bytes, key)?);
        }
        match encrypted {
            Some(true) => Ok(self.codec.decrypt(&bytes)?),
            Some(false) => Ok(bytes),
            None if bytes.len() > IV_LEN => {
                tracing::warn!(source, "no manifest: guessing encrypted from length");
                Ok(self.codec.decrypt(&bytes)?)
            }
            None => Ok(bytes),
        }
    }

    // ── Batch ────────────────────────────────────────────────────────────

    /// Download several addresses in order, one at a time. Stops at the
    /// first failure.
    pub async fn fetch_many(&self, addresses: &[ContentAddress]) -> Result<Vec<Vec<u8>>, VaultError> {
        let mut out = Vec::with_capacity(addresses.len());
        for address in addresses {
            let label = format!("fetch_many({address})");
            out.push(self.store.download(&label, address).await?);
        }
        tracing::debug!(count = out.len(), "batch download complete");
        Ok(out)
    }
}

async fn read_manifest(snapshot: &Path) -> Result<Option<BackupManifest>, VaultError> {
    let path = manifest_path(snapshot);
    match tokio::fs::read(&path).await {
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(VaultError::local(path, e)),
    }
}
