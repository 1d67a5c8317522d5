use arca_transport::BlobClient;

use super::ContentStore;
use crate::error::VaultError;
use crate::types::ContentAddress;

#[async_trait::async_trait]
impl ContentStore for BlobClient {
    async fn upload(&self, payload: &[u8]) -> Result<ContentAddress, VaultError> {
        let address = BlobClient::upload(self, payload).await?;
        Ok(ContentAddress::new(address))
    }

    async fn download(&self, address: &ContentAddress) -> Result<Vec<u8>, VaultError> {
        Ok(BlobClient::download(self, address.as_str()).await?)
    }
}
