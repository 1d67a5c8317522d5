//! Filesystem utilities for atomic writes.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

/// Write `bytes` to `destination` atomically.
///
/// The bytes land in a temporary sibling first and are renamed over the
/// destination, so readers see either the old file or the complete new
/// one. On failure the temporary file is removed and the destination is
/// left untouched.
pub async fn write_atomic(destination: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp_path = temp_sibling(destination);

    if let Err(e) = write_synced(&temp_path, bytes).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }
    rename_with_fallback(&temp_path, destination).await
}

/// Write `primary` and its small `companion` file so that either both are
/// replaced or neither is.
///
/// Both are staged to temporary siblings first. The companion is renamed
/// into place before the primary; if the primary rename then fails, the
/// companion's previous contents (held in memory) are put back, or the
/// companion is removed if it did not exist.
pub async fn write_atomic_pair(
    primary: &Path,
    primary_bytes: &[u8],
    companion: &Path,
    companion_bytes: &[u8],
) -> io::Result<()> {
    let primary_tmp = temp_sibling(primary);
    let companion_tmp = temp_sibling(companion);
    let staged = match write_synced(&primary_tmp, primary_bytes).await {
        Ok(()) => write_synced(&companion_tmp, companion_bytes).await,
        Err(e) => Err(e),
    };
    if let Err(e) = staged {
        discard(&[primary_tmp.as_path(), companion_tmp.as_path()]).await;
        return Err(e);
    }

    let previous = match fs::read(companion).await {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            discard(&[primary_tmp.as_path(), companion_tmp.as_path()]).await;
            return Err(e);
        }
    };

    // rename_with_fallback may have removed the old companion before failing.
    if let Err(e) = rename_with_fallback(&companion_tmp, companion).await {
        discard(&[primary_tmp.as_path()]).await;
        put_back(companion, previous).await;
        return Err(e);
    }
    if let Err(e) = rename_with_fallback(&primary_tmp, primary).await {
        put_back(companion, previous).await;
        return Err(e);
    }
    Ok(())
}

async fn put_back(path: &Path, previous: Option<Vec<u8>>) {
    let _ = match previous {
        Some(bytes) => write_atomic(path, &bytes).await,
        None => fs::remove_file(path).await,
    };
}

async fn discard(paths: &[&Path]) {
    for path in paths {
        let _ = fs::remove_file(path).await;
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Rename, removing the destination and retrying on platforms where
/// rename refuses to replace an existing file. Cleans up `temp_path` if
/// the rename ultimately fails.
pub async fn rename_with_fallback(temp_path: &Path, destination: &Path) -> io::Result<()> {
    if let Err(initial_err) = fs::rename(temp_path, destination).await {
        let _ = fs::remove_file(destination).await;
        if let Err(retry_err) = fs::rename(temp_path, destination).await {
            let _ = fs::remove_file(temp_path).await;
            return Err(io::Error::new(
                retry_err.kind(),
                format!("atomic rename failed (initial: {initial_err}, retry: {retry_err})"),
            ));
        }
    }
    Ok(())
}

/// `dir/.name.tmp-<random>` next to `destination`.
pub(crate) fn temp_sibling(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_name = format!(".{name}.tmp-{:016x}", rand::random::<u64>());
    destination.with_file_name(temp_name)
}

/// Whether a directory entry name is a leftover from [`write_atomic`].
pub(crate) fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(".tmp-")
}
