/// Typed records on top of the store and the key index.
///
/// Each public call is one breaker operation (labelled e.g.
/// `put_record(account:42)`) covering every remote step inside it.
/// Records are JSON, encrypted with the codec before they leave the
/// process.
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backup::BackupCoordinator;
use crate::breaker::CircuitBreaker;
use crate::config::VaultConfig;
use crate::crypto::CryptoCodec;
use crate::error::VaultError;
use crate::index::{FileKeyIndex, KeyIndex};
use crate::lineage::{lineage_key, LineageRecord};
use crate::locks::KeyLocks;
use crate::store::{ContentStore, GuardedStore};
use crate::types::ContentAddress;

/// Lineage `type` stamped on records.
pub const RECORD_KIND: &str = "json";

/// Logical keys for the application namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Account(String),
    Memory { table: String, id: String },
    Goal(String),
    Lineage(ContentAddress),
}

impl RecordKey {
    pub fn account(id: impl Into<String>) -> Self {
        RecordKey::Account(id.into())
    }

    pub fn memory(table: impl Into<String>, id: impl Into<String>) -> Self {
        RecordKey::Memory {
            table: table.into(),
            id: id.into(),
        }
    }

    pub fn goal(id: impl Into<String>) -> Self {
        RecordKey::Goal(id.into())
    }

    /// Prefix that lists every key of this key's namespace (and table).
    pub fn namespace(&self) -> String {
        match self {
            RecordKey::Account(_) => "account:".into(),
            RecordKey::Memory { table, .. } => format!("memory:{table}:"),
            RecordKey::Goal(_) => "goal:".into(),
            RecordKey::Lineage(_) => "lineage:".into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Account(id) => write!(f, "account:{id}"),
            RecordKey::Memory { table, id } => write!(f, "memory:{table}:{id}"),
            RecordKey::Goal(id) => write!(f, "goal:{id}"),
            RecordKey::Lineage(address) => f.write_str(&lineage_key(address)),
        }
    }
}

pub struct RecordVault {
    codec: CryptoCodec,
    store: Arc<GuardedStore>,
    index: Arc<dyn KeyIndex>,
    locks: Arc<KeyLocks>,
}

impl RecordVault {
    pub fn new(
        codec: CryptoCodec,
        store: Arc<GuardedStore>,
        index: Arc<dyn KeyIndex>,
        locks: Arc<KeyLocks>,
    ) -> Self {
        Self {
            codec,
            store,
            index,
            locks,
        }
    }

    pub fn store(&self) -> &GuardedStore {
        &self.store
    }

    /// Store `record` under `key`, replacing whatever the key pointed to.
    pub async fn put_record<T: Serialize + Sync>(
        &self,
        key: &str,
        record: &T,
    ) -> Result<ContentAddress, VaultError> {
        let sealed = self.seal(record)?;
        let _guard = self.locks.lock(key).await;

        let label = format!("put_record({key})");
        self.store
            .run(&label, async {
                let address = self.store.inner().upload(&sealed).await?;
                self.index.put(key, &address).await?;
                Ok::<_, VaultError>(address)
            })
            .await
    }

    /// Store `record` and a lineage record describing it.
    ///
    /// The record's own key is indexed before its lineage, so a lineage
    /// entry never points at an address no key refers to.
    pub async fn put_record_with_lineage<T: Serialize + Sync>(
        &self,
        key: &str,
        record: &T,
        origin: &str,
        creator: &str,
    ) -> Result<ContentAddress, VaultError> {
        let sealed = self.seal(record)?;
        let _guard = self.locks.lock(key).await;

        let label = format!("put_record_with_lineage({key})");
        self.store
            .run(&label, async {
                let address = self.store.inner().upload(&sealed).await?;
                self.index.put(key, &address).await?;

                let lineage = LineageRecord::new(address.clone(), origin, creator, RECORD_KIND);
                let lineage_sealed = self.codec.encrypt(&lineage.to_bytes()?)?;
                let lineage_address = self.store.inner().upload(&lineage_sealed).await?;
                self.index.put(&lineage_key(&address), &lineage_address).await?;
                Ok::<_, VaultError>(address)
            })
            .await
    }

    /// The record under `key`, or `None` if the key is not indexed.
    pub async fn get_record<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, VaultError> {
        let label = format!("get_record({key})");
        self.store
            .run(&label, async {
                match self.index.get(key).await? {
                    Some(address) => self.fetch(&address).await.map(Some),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Every record whose key starts with `prefix`, fetched one at a time.
    /// Order is unspecified.
    pub async fn list_records<T: DeserializeOwned + Send>(&self, prefix: &str) -> Result<Vec<T>, VaultError> {
        let label = format!("list_records({prefix})");
        self.store
            .run(&label, async {
                let addresses = self.index.list_by_prefix(prefix).await?;
                let mut records = Vec::with_capacity(addresses.len());
                for address in &addresses {
                    records.push(self.fetch(address).await?);
                }
                Ok::<_, VaultError>(records)
            })
            .await
    }

    /// Lineage of the artifact at `address`, if any was recorded.
    pub async fn lineage_of(&self, address: &ContentAddress) -> Result<Option<LineageRecord>, VaultError> {
        let key = lineage_key(address);
        let label = format!("lineage_of({address})");
        self.store
            .run(&label, async {
                let Some(lineage_address) = self.index.get(&key).await? else {
                    return Ok(None);
                };
                let sealed = self.store.inner().download(&lineage_address).await?;
                LineageRecord::from_bytes(&self.codec.decrypt(&sealed)?).map(Some)
            })
            .await
    }

    fn seal<T: Serialize>(&self, record: &T) -> Result<Vec<u8>, VaultError> {
        Ok(self.codec.encrypt(&serde_json::to_vec(record)?)?)
    }

    async fn fetch<T: DeserializeOwned>(&self, address: &ContentAddress) -> Result<T, VaultError> {
        let sealed = self.store.inner().download(address).await?;
        Ok(serde_json::from_slice(&self.codec.decrypt(&sealed)?)?)
    }
}

/// Backups and records wired over one store, one breaker, one index
/// and one set of key locks.
pub struct Vault {
    pub backups: BackupCoordinator,
    pub records: RecordVault,
}

impl Vault {
    /// Wire everything from `config` around `store`.
    pub async fn open(config: &VaultConfig, store: Arc<dyn ContentStore>) -> Result<Self, VaultError> {
        let index: Arc<dyn KeyIndex> = Arc::new(FileKeyIndex::open(&config.index_dir).await?);
        Self::with_index(config, store, index)
    }

    /// Like [`Vault::open`] with a caller-supplied index.
    pub fn with_index(
        config: &VaultConfig,
        store: Arc<dyn ContentStore>,
        index: Arc<dyn KeyIndex>,
    ) -> Result<Self, VaultError> {
        config.breaker.validate()?;
        let codec = config.codec()?;
        let guarded = Arc::new(GuardedStore::new(
            store,
            CircuitBreaker::new(config.breaker.clone()),
            config.call_timeout,
        ));
        let locks = Arc::new(KeyLocks::new());

        let backups = BackupCoordinator::new(codec.clone(), guarded.clone(), index.clone())
            .with_locks(locks.clone())
            .with_creator(config.creator.clone());
        let records = RecordVault::new(codec, guarded, index, locks);
        Ok(Self { backups, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerConfig, CircuitBreaker, CircuitStatus};
    use crate::index::{IndexEntry, MemoryKeyIndex};
    use crate::store::MemoryStore;
    use serde::Deserialize;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Goal {
        id: String,
        name: String,
    }

    fn goal(id: &str) -> Goal {
        Goal {
            id: id.into(),
            name: format!("goal {id}"),
        }
    }

    fn vault(store: &MemoryStore, threshold: u32) -> RecordVault {
        vault_with_index(store, threshold, Arc::new(MemoryKeyIndex::new()))
    }

    fn vault_with_index(store: &MemoryStore, threshold: u32, index: Arc<dyn KeyIndex>) -> RecordVault {
        let guarded = GuardedStore::new(
            Arc::new(store.clone()),
            CircuitBreaker::new(BreakerConfig {
                failure_threshold: threshold,
                ..BreakerConfig::default()
            }),
            Duration::from_secs(5),
        );
        RecordVault::new(
            CryptoCodec::default(),
            Arc::new(guarded),
            index,
            Arc::new(KeyLocks::new()),
        )
    }

    /// Memory index whose writes under `lineage:` always fail.
    #[derive(Default)]
    struct LineageWritesFail(MemoryKeyIndex);

    #[async_trait::async_trait]
    impl KeyIndex for LineageWritesFail {
        async fn put(&self, key: &str, address: &ContentAddress) -> Result<(), VaultError> {
            if key.starts_with("lineage:") {
                return Err(VaultError::index(key, std::io::Error::other("disk full")));
            }
            self.0.put(key, address).await
        }

        async fn get(&self, key: &str) -> Result<Option<ContentAddress>, VaultError> {
            self.0.get(key).await
        }

        async fn entries_by_prefix(&self, prefix: &str) -> Result<Vec<IndexEntry>, VaultError> {
            self.0.entries_by_prefix(prefix).await
        }

        async fn remove(&self, key: &str) -> Result<(), VaultError> {
            self.0.remove(key).await
        }
    }

    #[test]
    fn record_key_formats() {
        assert_eq!(RecordKey::account("42").to_string(), "account:42");
        assert_eq!(RecordKey::memory("documents", "7").to_string(), "memory:documents:7");
        assert_eq!(RecordKey::goal("1").to_string(), "goal:1");
        assert_eq!(
            RecordKey::Lineage(ContentAddress::new("bafy")).to_string(),
            "lineage:bafy"
        );
        assert_eq!(RecordKey::memory("documents", "7").namespace(), "memory:documents:");
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let store = MemoryStore::new();
        let v = vault(&store, 5);
        let key = RecordKey::goal("1").to_string();

        let address = v.put_record(&key, &goal("1")).await.unwrap();
        assert_eq!(v.get_record::<Goal>(&key).await.unwrap(), Some(goal("1")));

        // stored encrypted
        let stored = store.get(&address).unwrap();
        assert!(serde_json::from_slice::<Goal>(&stored).is_err());
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let store = MemoryStore::new();
        let v = vault(&store, 5);
        assert_eq!(v.get_record::<Goal>("goal:404").await.unwrap(), None);
        assert_eq!(store.download_calls(), 0);
    }

    #[tokio::test]
    async fn list_records_by_namespace() {
        let store = MemoryStore::new();
        let v = vault(&store, 5);
        v.put_record("goal:1", &goal("1")).await.unwrap();
        v.put_record("goal:2", &goal("2")).await.unwrap();
        v.put_record("account:1", &goal("x")).await.unwrap();

        let mut goals: Vec<Goal> = v.list_records("goal:").await.unwrap();
        goals.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(goals, vec![goal("1"), goal("2")]);
    }

    #[tokio::test]
    async fn lineage_is_recorded_and_readable() {
        let store = MemoryStore::new();
        let v = vault(&store, 5);
        let key = RecordKey::memory("documents", "7").to_string();

        let address = v
            .put_record_with_lineage(&key, &goal("7"), "memory:documents", "user-7")
            .await
            .unwrap();
        let lineage = v.lineage_of(&address).await.unwrap().unwrap();
        assert_eq!(lineage.address, address);
        assert_eq!(lineage.origin, "memory:documents");
        assert_eq!(lineage.creator, "user-7");
        assert_eq!(lineage.kind, RECORD_KIND);

        assert!(v.lineage_of(&ContentAddress::new("other")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn each_call_is_one_breaker_operation() {
        let store = MemoryStore::new();
        let v = vault(&store, 2);
        store.set_failing(true);

        for _ in 0..2 {
            let err = v.put_record("account:1", &goal("a")).await.unwrap_err();
            assert!(matches!(err, VaultError::StorageUnavailable(_)));
        }
        assert_eq!(v.store().breaker().status(), CircuitStatus::Open);

        let err = v.get_record::<Goal>("account:1").await.unwrap_err();
        assert_eq!(err.to_string(), "circuit open: get_record(account:1) rejected");
    }

    #[tokio::test]
    async fn wired_vault_shares_one_breaker() {
        let store = MemoryStore::new();
        let config = VaultConfig::default().breaker(BreakerConfig {
            failure_threshold: 1,
            ..BreakerConfig::default()
        });
        let vault = Vault::with_index(&config, Arc::new(store.clone()), Arc::new(MemoryKeyIndex::new())).unwrap();

        store.set_failing(true);
        assert!(vault.records.put_record("goal:1", &goal("1")).await.is_err());
        assert_eq!(vault.backups.store().breaker().status(), CircuitStatus::Open);
    }

    #[tokio::test]
    async fn failed_lineage_write_leaves_record_indexed() {
        let store = MemoryStore::new();
        let index = Arc::new(LineageWritesFail::default());
        let v = vault_with_index(&store, 5, index.clone());

        let err = v
            .put_record_with_lineage("goal:1", &goal("1"), "goal", "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::IndexUnavailable { .. }));

        assert_eq!(v.get_record::<Goal>("goal:1").await.unwrap(), Some(goal("1")));
        assert!(index.entries_by_prefix("lineage:").await.unwrap().is_empty());
    }

    #[test]
    fn wiring_rejects_unrecoverable_breaker() {
        let config = VaultConfig::default().breaker(BreakerConfig {
            half_open_max_attempts: 0,
            ..BreakerConfig::default()
        });
        let res = Vault::with_index(&config, Arc::new(MemoryStore::new()), Arc::new(MemoryKeyIndex::new()));
        assert!(matches!(res, Err(VaultError::Config(_))));
    }

    #[tokio::test]
    async fn concurrent_writers_to_one_key_are_serialized() {
        let store = MemoryStore::new();
        // Earlier uploads take longer, so unserialized writers would finish
        // in reverse order of arrival.
        store.set_upload_delays((1..=8).rev().map(|ms| Duration::from_millis(ms * 5)));
        let v = Arc::new(vault(&store, 5));
        let finished = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let v = v.clone();
            let finished = finished.clone();
            handles.push(tokio::spawn(async move {
                v.put_record("goal:shared", &goal(&i.to_string())).await.unwrap();
                finished.lock().unwrap().push(i);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.peak_concurrent_uploads(), 1);
        let last = *finished.lock().unwrap().last().unwrap();
        let current: Goal = v.get_record("goal:shared").await.unwrap().unwrap();
        assert_eq!(current, goal(&last.to_string()));
    }
}
