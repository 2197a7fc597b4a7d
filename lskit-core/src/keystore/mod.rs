//! Client interface of the authenticated keystore.
//!
//! The keystore itself lives on the platform side: Keychain Services on iOS,
//! the Android Keystore backed secure storage on Android. Both gate access
//! behind device authentication and may refuse to open on devices without a
//! secure lock screen. This module only defines the capabilities the
//! provisioner consumes.
//!
//! Two implementations ship with the crate:
//!
//! - [`memory::MemoryKeyStore`]: scriptable in-memory store for tests
//! - [`file::FileKeyStore`]: unauthenticated JSON files for development

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ListError, OpenError, ReadError, RemediationError, WriteError};

pub mod file;
pub mod memory;

/// Logical name of the keystore instance that holds the storage key.
pub const DEFAULT_STORE_NAME: &str = "outsystems-key-store";

/// Logical name of the entry holding the storage key.
pub const DEFAULT_ENTRY_NAME: &str = "outsystems-local-storage-key";

/// Name of a keystore instance. Opened once per acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyStoreIdentity(String);

impl KeyStoreIdentity {
    /// Creates an identity from a store name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the store name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for KeyStoreIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_NAME)
    }
}

impl fmt::Display for KeyStoreIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entry point to the platform's authenticated keystore.
#[async_trait]
pub trait AuthenticatedKeyStore: Send + Sync {
    /// Opens the store named by `identity`, authenticating the user if needed.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::AuthSkipped`] when the user dismisses
    /// authentication, [`OpenError::InsecureDevice`] when the device has no
    /// secure lock screen, [`OpenError::MigrationFailed`] when an earlier
    /// format migration broke the store, and [`OpenError::NotReady`] or
    /// [`OpenError::Other`] for platform failures.
    async fn open(
        &self,
        identity: &KeyStoreIdentity,
    ) -> Result<Box<dyn KeyStoreSession>, OpenError>;

    /// Walks the user through securing the device (setting a lock screen).
    ///
    /// Only invoked after the user agreed to remediate an insecure device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is still not secured afterwards.
    async fn secure_device(&self) -> Result<(), RemediationError>;
}

/// An opened keystore instance.
#[async_trait]
pub trait KeyStoreSession: Send + Sync {
    /// Lists the names of all entries.
    ///
    /// Entries written by older store formats may be missing from this list
    /// even though [`KeyStoreSession::get`] still returns them.
    ///
    /// # Errors
    ///
    /// Returns [`ListError::AuthSkipped`] if authentication was dismissed.
    async fn list_keys(&self) -> Result<BTreeSet<String>, ListError>;

    /// Reads the value stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::NotFound`] if no such entry exists.
    async fn get(&self, name: &str) -> Result<String, ReadError>;

    /// Stores `value` under `name` and returns the name.
    ///
    /// # Errors
    ///
    /// Returns an error if the value could not be durably written.
    async fn set(&self, name: &str, value: &str) -> Result<String, WriteError>;
}
