//! Arca vault layer.
//!
//! Encrypted, content-addressed backup and restore of application
//! records against an unreliable remote blob store, on top of
//! `arca-transport`.
//!
//! Crypto: AES-256-CBC, `iv || ciphertext`.
//! Index: one JSON file per logical key.
//! Fault isolation: every remote call goes through a circuit breaker
//! with a per-call timeout.

pub mod backup;
pub mod breaker;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod index;
pub mod lineage;
pub mod locks;
pub mod store;
pub mod types;
pub mod vault;

pub use backup::{
    manifest_path, BackupCoordinator, BackupManifest, BackupRequest, RestoreRequest, RestoreSource,
};
pub use breaker::{BreakerConfig, BreakerStats, CircuitBreaker, CircuitState, CircuitStatus};
pub use config::VaultConfig;
pub use crypto::{decrypt, encrypt, CryptoCodec, EncryptionKey, IV_LEN, KEY_LEN};
pub use error::{CryptoError, VaultError};
pub use index::{FileKeyIndex, IndexEntry, KeyIndex, MemoryKeyIndex};
pub use lineage::{lineage_key, LineageRecord};
pub use locks::KeyLocks;
pub use store::{ContentStore, GuardedStore, MemoryStore};
pub use types::{now_ms, ContentAddress};
pub use vault::{RecordKey, RecordVault, Vault};
