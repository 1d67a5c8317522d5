use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};

use super::ContentStore;
use crate::error::VaultError;
use crate::types::ContentAddress;

/// In-process content store.
///
/// Addresses are the hex SHA-256 of the payload, so uploading the same
/// bytes twice yields the same address. Clones share state. The failure
/// toggles make it usable as a test double for an unreliable remote; the
/// upload delays and the overlap counter make it usable for checking
/// write serialization.
#[derive(Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<Mutex<HashMap<ContentAddress, Vec<u8>>>>,
    uploads: Arc<AtomicU64>,
    downloads: Arc<AtomicU64>,
    failing: Arc<AtomicBool>,
    hanging: Arc<AtomicBool>,
    upload_delays: Arc<Mutex<VecDeque<Duration>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call fails with `StorageUnavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every subsequent call never completes.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    /// The next uploads sleep for these durations, in order, before
    /// completing. Later uploads are not delayed.
    pub fn set_upload_delays(&self, delays: impl IntoIterator<Item = Duration>) {
        let mut queue = self.upload_delays.lock().unwrap_or_else(|p| p.into_inner());
        *queue = delays.into_iter().collect();
    }

    /// Most uploads ever in progress at the same time.
    pub fn peak_concurrent_uploads(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Upload attempts seen, failed ones included.
    pub fn upload_calls(&self) -> u64 {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Download attempts seen, failed ones included.
    pub fn download_calls(&self) -> u64 {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Raw stored bytes, bypassing the call counters and toggles.
    pub fn get(&self, address: &ContentAddress) -> Option<Vec<u8>> {
        self.lock().get(address).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ContentAddress, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn gate(&self, op: &str) -> Result<(), VaultError> {
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(VaultError::StorageUnavailable(format!(
                "memory store: {op} forced to fail"
            )));
        }
        Ok(())
    }
}

fn address_of(payload: &[u8]) -> ContentAddress {
    ContentAddress::new(hex::encode(Sha256::digest(payload)))
}

#[async_trait::async_trait]
impl ContentStore for MemoryStore {
    async fn upload(&self, payload: &[u8]) -> Result<ContentAddress, VaultError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = self
            .upload_delays
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let gated = self.gate("upload").await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        gated?;

        let address = address_of(payload);
        self.lock().insert(address.clone(), payload.to_vec());
        Ok(address)
    }

    async fn download(&self, address: &ContentAddress) -> Result<Vec<u8>, VaultError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.gate("download").await?;

        self.get(address).ok_or_else(|| {
            VaultError::StorageProtocol(format!("memory store: no payload for {address}"))
        })
    }

    async fn delete(&self, address: &ContentAddress) -> Result<(), VaultError> {
        self.gate("delete").await?;
        self.lock().remove(address);
        Ok(())
    }
}
