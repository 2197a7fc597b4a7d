//! Provisioning configuration.

use serde::Deserialize;

use crate::keystore::{KeyStoreIdentity, DEFAULT_ENTRY_NAME};

/// Names under which the storage key is kept.
///
/// The defaults match the names used by every released version of the app.
/// Changing them on an existing install makes the previous key unreachable,
/// which in turn makes the encrypted database unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Keystore instance holding the entry.
    pub store_name: KeyStoreIdentity,
    /// Entry holding the storage key.
    pub entry_name: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            store_name: KeyStoreIdentity::default(),
            entry_name: DEFAULT_ENTRY_NAME.to_string(),
        }
    }
}
