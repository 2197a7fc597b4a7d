//! Acquisition of the local storage key.
//!
//! # State machine
//!
//! ```text
//!            cache populated
//! acquire ─────────────────────────────────────────────▶ CacheHit
//!    │
//!    ▼
//! Opening ──▶ Migrating ──▶ Listing ──┬──▶ ReadingExisting ──▶ key
//!  ▲   │                              └──▶ Generating ──────▶ key
//!  │   │ insecure device
//!  │   ▼
//! Remediating
//! ```
//!
//! Any state may end the acquisition with an error. Fatal conditions go
//! through the [`Host`] first: a notice is shown when one is attached to the
//! [`FatalReason`], then the host is told to terminate.
//!
//! # Migration rewrite
//!
//! Entries written by older keystore formats can be invisible to
//! `list_keys` while `get` still returns them. Right after opening, the
//! entry is read and written back unchanged through the current store
//! implementation, which normalizes it. The rewrite is best effort: its
//! failures are logged and never change the outcome of the acquisition.
//!
//! # Existing keys are never replaced
//!
//! When the entry is listed but cannot be read, the error is returned to
//! the caller. Generating a replacement would orphan every database already
//! encrypted under the original key.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::cache::ProcessKeyCache;
use crate::config::ProvisioningConfig;
use crate::error::{
    FatalReason, ListError, OpenError, ProvisioningError, ProvisioningResult, ReadError,
};
use crate::host::{self, Host, SECURE_DEVICE_PROMPT};
use crate::key::{LocalStorageKey, SecureRandomKeyGenerator};
use crate::keystore::{AuthenticatedKeyStore, KeyStoreSession};

/// Observable states of an acquisition, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    /// The cached key was returned without touching the keystore.
    CacheHit,
    /// Opening the keystore.
    Opening,
    /// Asking the user to secure the device before opening again.
    Remediating,
    /// Rewriting the existing entry in the current store format.
    Migrating,
    /// Listing entry names.
    Listing,
    /// Reading the existing key.
    ReadingExisting,
    /// Generating and persisting a new key.
    Generating,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CacheHit => "cache_hit",
            Self::Opening => "opening",
            Self::Remediating => "remediating",
            Self::Migrating => "migrating",
            Self::Listing => "listing",
            Self::ReadingExisting => "reading_existing",
            Self::Generating => "generating",
        };
        f.write_str(label)
    }
}

enum Step {
    Opening,
    Remediating,
    Migrating(Box<dyn KeyStoreSession>),
    Listing(Box<dyn KeyStoreSession>),
    ReadingExisting(Box<dyn KeyStoreSession>),
    Generating(Box<dyn KeyStoreSession>),
}

impl Step {
    const fn state(&self) -> ProvisioningState {
        match self {
            Self::Opening => ProvisioningState::Opening,
            Self::Remediating => ProvisioningState::Remediating,
            Self::Migrating(_) => ProvisioningState::Migrating,
            Self::Listing(_) => ProvisioningState::Listing,
            Self::ReadingExisting(_) => ProvisioningState::ReadingExisting,
            Self::Generating(_) => ProvisioningState::Generating,
        }
    }
}

/// Resolves the local storage key, creating it on first launch.
///
/// Construct one per process at startup and share it (for instance behind an
/// [`Arc`]) with everything that opens the encrypted database. It owns the
/// [`ProcessKeyCache`], so the keystore is only consulted until the first
/// acquisition succeeds.
///
/// Concurrent cache misses are serialized: the first caller drives the
/// keystore while the others wait and then pick up the cached key.
pub struct KeyProvisioner {
    keystore: Arc<dyn AuthenticatedKeyStore>,
    host: Arc<dyn Host>,
    generator: SecureRandomKeyGenerator,
    cache: ProcessKeyCache,
    config: ProvisioningConfig,
    inflight: Mutex<()>,
}

impl fmt::Debug for KeyProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyProvisioner")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl KeyProvisioner {
    /// Creates a provisioner using the default store and entry names.
    #[must_use]
    pub fn new(keystore: Arc<dyn AuthenticatedKeyStore>, host: Arc<dyn Host>) -> Self {
        Self::with_config(keystore, host, ProvisioningConfig::default())
    }

    /// Creates a provisioner with explicit configuration.
    #[must_use]
    pub fn with_config(
        keystore: Arc<dyn AuthenticatedKeyStore>,
        host: Arc<dyn Host>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            keystore,
            host,
            generator: SecureRandomKeyGenerator::new(),
            cache: ProcessKeyCache::new(),
            config,
            inflight: Mutex::new(()),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// The process-wide key cache owned by this provisioner.
    #[must_use]
    pub const fn cache(&self) -> &ProcessKeyCache {
        &self.cache
    }

    /// Returns the local storage key, provisioning it if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Terminated`] after the host was told to
    /// terminate the process, or a recoverable keystore error the caller may
    /// retry.
    pub async fn acquire(&self) -> ProvisioningResult<LocalStorageKey> {
        if let Some(key) = self.cache.read().await {
            log::trace!("key provisioning: {}", ProvisioningState::CacheHit);
            return Ok(key);
        }

        let _inflight = self.inflight.lock().await;
        if let Some(key) = self.cache.read().await {
            log::trace!("key provisioning: {} after wait", ProvisioningState::CacheHit);
            return Ok(key);
        }

        self.run().await
    }

    async fn run(&self) -> ProvisioningResult<LocalStorageKey> {
        let mut step = Step::Opening;
        loop {
            log::debug!("key provisioning: {}", step.state());
            step = match step {
                Step::Opening => self.open().await?,
                Step::Remediating => self.remediate().await?,
                Step::Migrating(session) => {
                    self.migrate(session.as_ref()).await;
                    Step::Listing(session)
                }
                Step::Listing(session) => self.list(session).await?,
                Step::ReadingExisting(session) => {
                    return self.read_existing(session.as_ref()).await
                }
                Step::Generating(session) => return self.generate(session.as_ref()).await,
            };
        }
    }

    async fn open(&self) -> ProvisioningResult<Step> {
        match self.keystore.open(&self.config.store_name).await {
            Ok(session) => Ok(Step::Migrating(session)),
            Err(OpenError::AuthSkipped) => {
                Err(self.fail_closed(FatalReason::AuthenticationSkipped).await)
            }
            Err(OpenError::NotReady) => {
                Err(self.fail_closed(FatalReason::KeystoreNotReady).await)
            }
            Err(OpenError::InsecureDevice) => {
                log::warn!("device is not secure, asking the user to remediate");
                Ok(Step::Remediating)
            }
            Err(OpenError::MigrationFailed(detail)) => {
                log::error!("keystore migration failed: {detail}");
                Err(self.fail_closed(FatalReason::MigrationFailed).await)
            }
            Err(err @ OpenError::Other { .. }) => {
                log::warn!("failed to open {}: {err}", self.config.store_name);
                Err(err.into())
            }
        }
    }

    async fn remediate(&self) -> ProvisioningResult<Step> {
        if !self.host.confirm(SECURE_DEVICE_PROMPT).await {
            log::warn!("user declined to secure the device");
            return Err(self.fail_closed(FatalReason::DeviceNotSecured).await);
        }
        match self.keystore.secure_device().await {
            Ok(()) => Ok(Step::Opening),
            Err(err) => {
                log::warn!("{err}");
                Err(self.fail_closed(FatalReason::DeviceNotSecured).await)
            }
        }
    }

    async fn migrate(&self, session: &dyn KeyStoreSession) {
        let name = &self.config.entry_name;
        let value = match session.get(name).await {
            Ok(value) => Zeroizing::new(value),
            Err(ReadError::NotFound) => return,
            Err(err) => {
                log::debug!("skipping rewrite of {name}: {err}");
                return;
            }
        };
        match session.set(name, &value).await {
            Ok(_) => log::debug!("rewrote {name} in the current store format"),
            Err(err) => log::warn!("rewrite of {name} failed, continuing: {err}"),
        }
    }

    async fn list(&self, session: Box<dyn KeyStoreSession>) -> ProvisioningResult<Step> {
        match session.list_keys().await {
            Ok(names) if names.contains(&self.config.entry_name) => {
                Ok(Step::ReadingExisting(session))
            }
            Ok(_) => Ok(Step::Generating(session)),
            Err(ListError::AuthSkipped) => {
                Err(self.fail_closed(FatalReason::AuthenticationSkipped).await)
            }
            Err(err @ ListError::Other(_)) => {
                log::error!("error while listing keystore entries: {err}");
                Err(err.into())
            }
        }
    }

    async fn read_existing(
        &self,
        session: &dyn KeyStoreSession,
    ) -> ProvisioningResult<LocalStorageKey> {
        match session.get(&self.config.entry_name).await {
            Ok(value) => {
                let key = LocalStorageKey::new(value);
                log::debug!("loaded local storage key {}", key.fingerprint());
                self.cache.write(key.clone()).await;
                Ok(key)
            }
            Err(err) => {
                log::error!("error getting local storage key from keystore: {err}");
                Err(err.into())
            }
        }
    }

    async fn generate(&self, session: &dyn KeyStoreSession) -> ProvisioningResult<LocalStorageKey> {
        self.cache.clear().await;
        let key = self.generator.generate();
        match session.set(&self.config.entry_name, key.expose()).await {
            Ok(_) => {
                log::info!("stored new local storage key {}", key.fingerprint());
                self.cache.write(key.clone()).await;
                Ok(key)
            }
            Err(err) => {
                log::error!("error storing new local storage key: {err}");
                Err(err.into())
            }
        }
    }

    async fn fail_closed(&self, reason: FatalReason) -> ProvisioningError {
        host::fail_closed(self.host.as_ref(), reason).await;
        ProvisioningError::Terminated(reason)
    }
}
