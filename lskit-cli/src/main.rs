//! `lskit`: drives the local storage key provisioner from a terminal.
//!
//! Keys live in a file-backed development keystore. Nothing here is meant
//! for production devices.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use eyre::{eyre, WrapErr};
use lskit_core::host::Host;
use lskit_core::keystore::file::FileKeyStore;
use lskit_core::keystore::{DEFAULT_ENTRY_NAME, DEFAULT_STORE_NAME};
use lskit_core::{
    AuthenticatedKeyStore, FatalReason, KeyProvisioner, KeyStoreIdentity, ProvisioningConfig,
    SecureRandomKeyGenerator,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lskit")]
#[command(about = "Provision and inspect the local storage key", long_about = None)]
struct Cli {
    /// Directory holding the development keystore files
    #[arg(long, env = "LSKIT_STORE_DIR", global = true)]
    store_dir: Option<PathBuf>,

    /// Name of the keystore to open
    #[arg(long, env = "LSKIT_STORE_NAME", default_value = DEFAULT_STORE_NAME, global = true)]
    store_name: String,

    /// Name of the entry holding the key
    #[arg(long, env = "LSKIT_ENTRY_NAME", default_value = DEFAULT_ENTRY_NAME, global = true)]
    entry_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the local storage key, creating it if the store has none
    Acquire {
        /// Print the key itself instead of its fingerprint
        #[arg(long)]
        reveal: bool,
    },

    /// Generate a key without storing it
    Generate,

    /// List entry names in the keystore
    List,
}

impl Cli {
    fn store_dir(&self) -> eyre::Result<PathBuf> {
        if let Some(dir) = &self.store_dir {
            return Ok(dir.clone());
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("lskit"))
            .ok_or_else(|| eyre!("no data directory on this platform, pass --store-dir"))
    }

    fn config(&self) -> ProvisioningConfig {
        ProvisioningConfig {
            store_name: KeyStoreIdentity::new(self.store_name.clone()),
            entry_name: self.entry_name.clone(),
        }
    }
}

/// [`Host`] backed by the terminal.
struct TerminalHost;

#[async_trait]
impl Host for TerminalHost {
    async fn confirm(&self, message: &str) -> bool {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || prompt_yes_no(&message))
            .await
            .unwrap_or(false)
    }

    async fn alert(&self, message: &str) {
        eprintln!("{message}");
    }

    fn terminate(&self, reason: FatalReason) {
        tracing::error!(%reason, "terminating");
        std::process::exit(1);
    }
}

fn prompt_yes_no(message: &str) -> bool {
    eprint!("{message} [y/N] ");
    if io::stderr().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    is_consent(&answer)
}

fn is_consent(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes" | "ok")
}

async fn acquire(cli: &Cli, reveal: bool) -> eyre::Result<()> {
    let keystore = Arc::new(FileKeyStore::new(cli.store_dir()?));
    let provisioner = KeyProvisioner::with_config(keystore, Arc::new(TerminalHost), cli.config());
    let key = provisioner
        .acquire()
        .await
        .wrap_err("failed to acquire the local storage key")?;
    if reveal {
        println!("{}", key.expose());
    } else {
        println!("{}", key.fingerprint());
    }
    Ok(())
}

fn generate() {
    let key = SecureRandomKeyGenerator::new().generate();
    println!("{} ({} chars)", key.fingerprint(), key.expose().chars().count());
}

async fn list(cli: &Cli) -> eyre::Result<()> {
    let keystore = FileKeyStore::new(cli.store_dir()?);
    let session = keystore
        .open(&cli.config().store_name)
        .await
        .wrap_err("failed to open the keystore")?;
    let names = session
        .list_keys()
        .await
        .wrap_err("failed to list keystore entries")?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Acquire { reveal } => acquire(&cli, *reveal).await,
        Commands::Generate => {
            generate();
            Ok(())
        }
        Commands::List => list(&cli).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_answers() {
        assert!(is_consent("y\n"));
        assert!(is_consent(" YES "));
        assert!(is_consent("ok"));
        assert!(!is_consent(""));
        assert!(!is_consent("n\n"));
    }

    #[test]
    fn test_explicit_store_dir_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cli = Cli::parse_from([
            "lskit",
            "--store-dir",
            dir.path().to_str().expect("utf-8 path"),
            "--store-name",
            "dev",
            "list",
        ]);
        assert_eq!(cli.store_dir().expect("dir"), dir.path());
        assert_eq!(cli.config().store_name.as_str(), "dev");
        assert_eq!(cli.config().entry_name, DEFAULT_ENTRY_NAME);
    }

    #[tokio::test]
    async fn test_acquire_then_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().to_str().expect("utf-8 path");
        let cli = Cli::parse_from(["lskit", "--store-dir", path, "acquire"]);
        acquire(&cli, false).await.expect("acquire");

        let session = FileKeyStore::new(dir.path())
            .open(&KeyStoreIdentity::default())
            .await
            .expect("open");
        let names = session.list_keys().await.expect("list");
        assert!(names.contains(DEFAULT_ENTRY_NAME));
    }
}
