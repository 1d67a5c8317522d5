mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use arca_transport::{BlobClient, BlobClientConfig};
use arca_vault::{Vault, VaultConfig};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "arca", about = "Encrypted content-addressed backup vault")]
struct Cli {
    /// Blob API endpoint (overrides ARCA_STORE_ENDPOINT).
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Key index directory (overrides ARCA_INDEX_DIR).
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a payload and keep a local snapshot at PATH.
    Backup {
        /// Local snapshot path.
        #[arg(long)]
        path: PathBuf,
        /// Encrypt before upload.
        #[arg(long)]
        encrypt: bool,
        /// Inline payload.
        #[arg(long, conflicts_with = "input", required_unless_present = "input")]
        data: Option<String>,
        /// Read the payload from a file.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Logical key to index under (default: backup:<path>).
        #[arg(long)]
        key: Option<String>,
    },

    /// Restore a snapshot (local path, ipfs://ADDR or filecoin://ADDR).
    Restore {
        #[arg(long)]
        source: String,
        #[arg(long)]
        dest: PathBuf,
        /// Hex decryption key (default: manifest flag, then vault key).
        #[arg(long)]
        key: Option<String>,
    },

    /// Store a JSON record under KEY.
    Put {
        key: String,
        /// JSON file holding the record.
        #[arg(long)]
        input: PathBuf,
        /// Record a lineage entry with this origin.
        #[arg(long)]
        origin: Option<String>,
        /// Lineage creator (default: ARCA_CREATOR).
        #[arg(long, requires = "origin")]
        creator: Option<String>,
    },

    /// Print the record under KEY.
    Get { key: String },

    /// Print every record whose key starts with PREFIX.
    List { prefix: String },

    /// Print the lineage of a stored artifact.
    Lineage { address: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = VaultConfig::from_env()?;
    if let Some(dir) = cli.index_dir {
        config = config.index_dir(dir);
    }
    let mut client_config = BlobClientConfig::new();
    if let Some(endpoint) = cli.endpoint {
        client_config = client_config.endpoint(endpoint);
    }
    let client = BlobClient::new(client_config)?;

    if config.uses_placeholder_key() && !commands::is_loopback(client.collection_url()) {
        tracing::warn!(
            endpoint = %client.collection_url(),
            "ARCA_ENCRYPTION_KEY is unset or the public placeholder: payloads sent to a remote store are not confidential"
        );
    }

    let vault = Vault::open(&config, Arc::new(client)).await?;

    match cli.command {
        Command::Backup {
            path,
            encrypt,
            data,
            input,
            key,
        } => {
            let payload = commands::read_payload(data, input.as_deref()).await?;
            commands::backup(&vault, path, payload, encrypt, key).await?;
        }

        Command::Restore { source, dest, key } => {
            commands::restore(&vault, source, dest, key.as_deref()).await?;
        }

        Command::Put {
            key,
            input,
            origin,
            creator,
        } => {
            let creator = creator.unwrap_or_else(|| config.creator.clone());
            commands::put(&vault, &key, &input, origin.as_deref(), &creator).await?;
        }

        Command::Get { key } => commands::get(&vault, &key).await?,

        Command::List { prefix } => commands::list(&vault, &prefix).await?,

        Command::Lineage { address } => commands::lineage(&vault, &address).await?,
    }

    Ok(())
}
