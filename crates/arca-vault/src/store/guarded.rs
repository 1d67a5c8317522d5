use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::ContentStore;
use crate::breaker::CircuitBreaker;
use crate::error::VaultError;
use crate::types::ContentAddress;

/// A content store behind a circuit breaker and a per-call timeout.
///
/// Every call carries a label (usually the logical key being written or
/// read) that shows up in logs and in `CircuitOpen` errors. A timed-out
/// call counts as a breaker failure and surfaces as `StorageUnavailable`,
/// so a hung remote cannot hold a half-open trial slot forever.
pub struct GuardedStore {
    inner: Arc<dyn ContentStore>,
    breaker: CircuitBreaker,
    call_timeout: Duration,
}

impl GuardedStore {
    pub fn new(inner: Arc<dyn ContentStore>, breaker: CircuitBreaker, call_timeout: Duration) -> Self {
        Self {
            inner,
            breaker,
            call_timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// The unguarded store, for use inside [`GuardedStore::run`].
    pub fn inner(&self) -> &dyn ContentStore {
        self.inner.as_ref()
    }

    pub async fn upload(&self, label: &str, payload: &[u8]) -> Result<ContentAddress, VaultError> {
        let address = self.run(label, self.inner.upload(payload)).await?;
        tracing::debug!(operation = label, address = %address, bytes = payload.len(), "uploaded");
        Ok(address)
    }

    pub async fn download(&self, label: &str, address: &ContentAddress) -> Result<Vec<u8>, VaultError> {
        let bytes = self.run(label, self.inner.download(address)).await?;
        tracing::debug!(operation = label, address = %address, bytes = bytes.len(), "downloaded");
        Ok(bytes)
    }

    pub async fn delete(&self, label: &str, address: &ContentAddress) -> Result<(), VaultError> {
        self.run(label, self.inner.delete(address)).await
    }

    /// Run a whole multi-step operation as one breaker call under one
    /// timeout. Steps inside should use [`GuardedStore::inner`] so they
    /// are not counted twice.
    pub async fn run<T, Fut>(&self, label: &str, fut: Fut) -> Result<T, VaultError>
    where
        Fut: Future<Output = Result<T, VaultError>>,
    {
        self.breaker
            .call(label, || async move {
                match tokio::time::timeout(self.call_timeout, fut).await {
                    Ok(res) => res,
                    Err(_) => Err(VaultError::StorageUnavailable(format!(
                        "{label}: no response within {:?}",
                        self.call_timeout
                    ))),
                }
            })
            .await
    }
}
