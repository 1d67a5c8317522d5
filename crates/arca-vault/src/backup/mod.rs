/// Backup and restore of local snapshots through the remote store.
///
/// - **Types**: requests, the manifest, restore sources
/// - **Coordinator**: the backup / restore / batch-download flows
pub mod coordinator;
pub mod types;

pub use coordinator::{BackupCoordinator, DEFAULT_CREATOR};
pub use types::{
    manifest_path, BackupManifest, BackupRequest, RestoreRequest, RestoreSource, BACKUP_KEY_PREFIX,
    BACKUP_KIND, DEFAULT_ORIGIN, MANIFEST_SUFFIX,
};
