//! Injects the local storage key into database open calls.
//!
//! [`KeyedDatabaseOpener`] decorates the encrypted database engine's open
//! primitive. Calls that already carry a key pass straight through; all
//! others get the provisioned key. Both paths default the storage location.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ProvisioningError;
use crate::provisioning::KeyProvisioner;

/// Storage location used when the caller does not pick one.
pub const DEFAULT_LOCATION: &str = "default";

/// Options of a database open call.
///
/// Fields other than `key` and `location` are engine specific and passed
/// through untouched.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOptions {
    /// Encryption key. An empty string is passed through as is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Storage location hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Remaining engine-specific options.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OpenOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the storage location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets an engine-specific option.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    fn or_default_location(mut self) -> Self {
        if self.location.is_none() {
            self.location = Some(DEFAULT_LOCATION.to_string());
        }
        self
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("location", &self.location)
            .field("extra", &self.extra)
            .finish()
    }
}

/// The encrypted database engine's open primitive.
#[async_trait]
pub trait DatabaseOpener: Send + Sync {
    /// Handle to an opened database.
    type Database: Send;
    /// Error reported by the engine.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Opens the database described by `options`.
    ///
    /// # Errors
    ///
    /// Returns the engine's error, for instance when the key is missing or wrong.
    async fn open_database(&self, options: OpenOptions) -> Result<Self::Database, Self::Error>;
}

/// Capabilities of the wrapped engine, fixed when the opener is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseFeatures {
    /// The engine encrypts databases with `SQLCipher`.
    pub is_sqlcipher: bool,
}

/// Failure of a keyed open call.
#[derive(Debug, Error)]
pub enum InterceptError<E> {
    /// The key could not be provisioned.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    /// The database engine refused to open.
    #[error(transparent)]
    Database(E),
}

/// [`DatabaseOpener`] that supplies the local storage key.
pub struct KeyedDatabaseOpener<O> {
    inner: O,
    provisioner: Arc<KeyProvisioner>,
    features: DatabaseFeatures,
}

impl<O: DatabaseOpener> KeyedDatabaseOpener<O> {
    /// Wraps `inner`, an encrypting engine, with key injection.
    #[must_use]
    pub const fn new(inner: O, provisioner: Arc<KeyProvisioner>) -> Self {
        Self {
            inner,
            provisioner,
            features: DatabaseFeatures { is_sqlcipher: true },
        }
    }

    /// Capabilities of the wrapped engine.
    #[must_use]
    pub const fn features(&self) -> DatabaseFeatures {
        self.features
    }

    /// The wrapped engine, for callers that deliberately open without a key.
    #[must_use]
    pub const fn unkeyed(&self) -> &O {
        &self.inner
    }
}

impl<O> fmt::Debug for KeyedDatabaseOpener<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedDatabaseOpener")
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<O: DatabaseOpener> DatabaseOpener for KeyedDatabaseOpener<O> {
    type Database = O::Database;
    type Error = InterceptError<O::Error>;

    async fn open_database(&self, options: OpenOptions) -> Result<Self::Database, Self::Error> {
        let options = options.or_default_location();
        if options.key.is_some() {
            return self
                .inner
                .open_database(options)
                .await
                .map_err(InterceptError::Database);
        }

        let key = self.provisioner.acquire().await?;
        let mut keyed = options;
        keyed.key = Some(key.expose().to_string());
        self.inner
            .open_database(keyed)
            .await
            .map_err(InterceptError::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_json_shape() {
        let options: OpenOptions =
            serde_json::from_str(r#"{"name":"app.db","key":"abc123"}"#).expect("parse");
        assert_eq!(options.key.as_deref(), Some("abc123"));
        assert_eq!(options.location, None);
        assert_eq!(options.extra.get("name"), Some(&Value::from("app.db")));

        let json = serde_json::to_value(options.or_default_location()).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"name": "app.db", "key": "abc123", "location": "default"})
        );
    }

    #[test]
    fn test_explicit_location_is_kept() {
        let options = OpenOptions::new()
            .with_location("Library")
            .or_default_location();
        assert_eq!(options.location.as_deref(), Some("Library"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let options = OpenOptions::new().with_key("abc123");
        let debug = format!("{options:?}");
        assert!(!debug.contains("abc123"));
        assert!(debug.contains("REDACTED"));
    }
}
