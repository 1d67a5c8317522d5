/// Content-addressed blob storage.
///
/// In production: `arca_transport::BlobClient` (remote HTTP API).
/// In tests: [`MemoryStore`] (in-process, with failure toggles).
/// Everything the vault uploads goes through a [`GuardedStore`], which
/// adds the circuit breaker and a per-call timeout.
///
/// Payloads are opaque at this layer. Encryption happens above it.
mod guarded;
mod http;
mod memory;

pub use guarded::GuardedStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use crate::error::VaultError;
use crate::types::ContentAddress;

#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `payload` and return the address the store assigned to it.
    async fn upload(&self, payload: &[u8]) -> Result<ContentAddress, VaultError>;

    /// Fetch the payload previously stored under `address`.
    async fn download(&self, address: &ContentAddress) -> Result<Vec<u8>, VaultError>;

    /// Remove a stored payload. Most remote stores are append-only.
    async fn delete(&self, _address: &ContentAddress) -> Result<(), VaultError> {
        Err(VaultError::Unimplemented("delete"))
    }
}

#[async_trait::async_trait]
impl<S: ContentStore + ?Sized> ContentStore for Arc<S> {
    async fn upload(&self, payload: &[u8]) -> Result<ContentAddress, VaultError> {
        (**self).upload(payload).await
    }

    async fn download(&self, address: &ContentAddress) -> Result<Vec<u8>, VaultError> {
        (**self).download(address).await
    }

    async fn delete(&self, address: &ContentAddress) -> Result<(), VaultError> {
        (**self).delete(address).await
    }
}
