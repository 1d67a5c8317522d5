//! Arca transport layer.
//!
//! HTTP client for the remote blob API used by the backup vault.
//! Payloads are opaque here: encryption happens above this crate.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use arca_transport::{BlobClient, BlobClientConfig};
//!
//! # async fn example() -> Result<(), arca_transport::TransportError> {
//! let client = BlobClient::new(BlobClientConfig::new().endpoint("http://127.0.0.1:8080"))?;
//! let address = client.upload(b"hello").await?;
//! let bytes = client.download(&address).await?;
//! assert_eq!(bytes, b"hello");
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;

pub use client::{parse_download_response, parse_upload_response, BlobClient};
pub use config::{BlobClientConfig, DEFAULT_ENDPOINT};
pub use error::TransportError;
