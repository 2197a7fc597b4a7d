//! Local storage key provisioning for encrypted on-device databases.
//!
//! The app's local database is encrypted with a single symmetric key, the
//! local storage key. This crate creates that key on first launch, keeps it
//! in the platform's authenticated keystore, migrates entries written by
//! older keystore formats, and hands the key to the database engine.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lskit_core::host::ScriptedHost;
//! use lskit_core::keystore::file::FileKeyStore;
//! use lskit_core::KeyProvisioner;
//!
//! # async fn run() -> Result<(), lskit_core::ProvisioningError> {
//! let provisioner = KeyProvisioner::new(
//!     Arc::new(FileKeyStore::new("/tmp/lskit")),
//!     Arc::new(ScriptedHost::new()),
//! );
//! let key = provisioner.acquire().await?;
//! println!("local storage key {}", key.fingerprint());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod host;
pub mod interceptor;
pub mod key;
pub mod keystore;
pub mod logger;
pub mod provisioning;

mod error;
pub use error::*;

pub use cache::ProcessKeyCache;
pub use config::ProvisioningConfig;
pub use interceptor::{DatabaseOpener, KeyedDatabaseOpener, OpenOptions};
pub use key::{LocalStorageKey, SecureRandomKeyGenerator};
pub use keystore::{AuthenticatedKeyStore, KeyStoreIdentity, KeyStoreSession};
pub use provisioning::KeyProvisioner;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("lskit_core");
