use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use arca_vault::{BackupRequest, ContentAddress, EncryptionKey, RestoreRequest, Vault};
use url::{Host, Url};

/// Whether `url` points at this machine.
pub fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Inline `--data` or the contents of `--input`.
pub async fn read_payload(data: Option<String>, input: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match (data, input) {
        (Some(data), _) => Ok(data.into_bytes()),
        (None, Some(path)) => tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        (None, None) => bail!("one of --data or --input is required"),
    }
}

pub async fn backup(
    vault: &Vault,
    path: PathBuf,
    payload: Vec<u8>,
    encrypt: bool,
    key: Option<String>,
) -> anyhow::Result<()> {
    let mut req = BackupRequest::new(path, payload).encrypted(encrypt);
    if let Some(key) = key {
        req = req.key(key);
    }
    let manifest = vault.backups.backup(req).await?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    if !manifest.success {
        bail!("backup failed (see log for the cause)");
    }
    Ok(())
}

pub async fn restore(vault: &Vault, source: String, dest: PathBuf, key_hex: Option<&str>) -> anyhow::Result<()> {
    let mut req = RestoreRequest::new(source, dest);
    if let Some(hex_key) = key_hex {
        req = req.key(EncryptionKey::from_hex(hex_key).context("invalid --key")?);
    }
    let dest = req.destination.clone();
    if !vault.backups.restore(req).await {
        bail!("restore failed (see log for the cause)");
    }
    eprintln!("restored to {}", dest.display());
    Ok(())
}

pub async fn put(
    vault: &Vault,
    key: &str,
    input: &Path,
    origin: Option<&str>,
    creator: &str,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    let record: serde_json::Value =
        serde_json::from_slice(&raw).with_context(|| format!("{} is not JSON", input.display()))?;

    let address = match origin {
        Some(origin) => {
            vault
                .records
                .put_record_with_lineage(key, &record, origin, creator)
                .await?
        }
        None => vault.records.put_record(key, &record).await?,
    };
    println!("{address}");
    Ok(())
}

pub async fn get(vault: &Vault, key: &str) -> anyhow::Result<()> {
    match vault.records.get_record::<serde_json::Value>(key).await? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => bail!("no record under {key}"),
    }
}

pub async fn list(vault: &Vault, prefix: &str) -> anyhow::Result<()> {
    let records: Vec<serde_json::Value> = vault.records.list_records(prefix).await?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

pub async fn lineage(vault: &Vault, address: &str) -> anyhow::Result<()> {
    let address = ContentAddress::new(address);
    match vault.records.lineage_of(&address).await? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => bail!("no lineage recorded for {address}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_detection() {
        assert!(is_loopback(&Url::parse("http://localhost:8080/data").unwrap()));
        assert!(is_loopback(&Url::parse("http://127.0.0.1:9/").unwrap()));
        assert!(is_loopback(&Url::parse("http://[::1]:9/").unwrap()));
        assert!(!is_loopback(&Url::parse("https://api.storacha.network/data").unwrap()));
    }

    #[tokio::test]
    async fn payload_from_data_or_file() {
        assert_eq!(read_payload(Some("hi".into()), None).await.unwrap(), b"hi");

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("p.bin");
        std::fs::write(&file, b"from file").unwrap();
        assert_eq!(read_payload(None, Some(&file)).await.unwrap(), b"from file");

        assert!(read_payload(None, None).await.is_err());
    }
}
