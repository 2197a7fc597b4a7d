//! In-memory keystore for testing.
//!
//! **NOT secure.** Values are held in plain memory. The store is scriptable:
//! failures can be queued per capability, every call is counted, and entries
//! can be planted in a "legacy" format that [`KeyStoreSession::list_keys`]
//! does not report until they are rewritten through [`KeyStoreSession::set`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{AuthenticatedKeyStore, KeyStoreIdentity, KeyStoreSession};
use crate::error::{ListError, OpenError, ReadError, RemediationError, WriteError};

/// Number of calls observed per capability.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    /// Calls to [`AuthenticatedKeyStore::open`].
    pub open: usize,
    /// Calls to [`AuthenticatedKeyStore::secure_device`].
    pub secure_device: usize,
    /// Calls to [`KeyStoreSession::list_keys`].
    pub list_keys: usize,
    /// Calls to [`KeyStoreSession::get`].
    pub get: usize,
    /// Calls to [`KeyStoreSession::set`].
    pub set: usize,
}

impl CallCounts {
    /// Total number of keystore calls.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.open + self.secure_device + self.list_keys + self.get + self.set
    }
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, String>,
    legacy: BTreeSet<String>,
    open_failures: VecDeque<OpenError>,
    list_failures: VecDeque<ListError>,
    get_failures: VecDeque<ReadError>,
    set_failures: VecDeque<WriteError>,
    remediation_failures: VecDeque<RemediationError>,
    opened: Vec<KeyStoreIdentity>,
    writes: Vec<(String, String)>,
    calls: CallCounts,
}

/// In-memory [`AuthenticatedKeyStore`].
///
/// Clones share the same underlying state, which lets a test keep a handle
/// while the provisioner owns another.
#[derive(Debug, Default, Clone)]
pub struct MemoryKeyStore {
    state: Arc<Mutex<State>>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding a single entry.
    #[must_use]
    pub fn with_entry(name: &str, value: &str) -> Self {
        let store = Self::new();
        store.insert(name, value);
        store
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores an entry in the current format.
    pub fn insert(&self, name: &str, value: &str) {
        let mut state = self.state();
        state.legacy.remove(name);
        state.entries.insert(name.to_string(), value.to_string());
    }

    /// Stores an entry in the legacy format: readable, but not listed.
    pub fn insert_legacy(&self, name: &str, value: &str) {
        let mut state = self.state();
        state.legacy.insert(name.to_string());
        state.entries.insert(name.to_string(), value.to_string());
    }

    /// Returns the value stored under `name`.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<String> {
        self.state().entries.get(name).cloned()
    }

    /// Whether `name` is still stored in the legacy format.
    #[must_use]
    pub fn is_legacy(&self, name: &str) -> bool {
        self.state().legacy.contains(name)
    }

    /// Makes the next `open` fail with `error`.
    pub fn fail_next_open(&self, error: OpenError) {
        self.state().open_failures.push_back(error);
    }

    /// Makes the next `list_keys` fail with `error`.
    pub fn fail_next_list(&self, error: ListError) {
        self.state().list_failures.push_back(error);
    }

    /// Makes the next `get` fail with `error`.
    pub fn fail_next_get(&self, error: ReadError) {
        self.state().get_failures.push_back(error);
    }

    /// Makes the next `set` fail with `error`.
    pub fn fail_next_set(&self, error: WriteError) {
        self.state().set_failures.push_back(error);
    }

    /// Makes the next `secure_device` fail with `error`.
    pub fn fail_next_remediation(&self, error: RemediationError) {
        self.state().remediation_failures.push_back(error);
    }

    /// Returns the call counters.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    /// Identities passed to successful and failed `open` calls, in order.
    #[must_use]
    pub fn opened(&self) -> Vec<KeyStoreIdentity> {
        self.state().opened.clone()
    }

    /// Every successful `set`, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(String, String)> {
        self.state().writes.clone()
    }
}

#[async_trait]
impl AuthenticatedKeyStore for MemoryKeyStore {
    async fn open(
        &self,
        identity: &KeyStoreIdentity,
    ) -> Result<Box<dyn KeyStoreSession>, OpenError> {
        let failure = {
            let mut state = self.state();
            state.calls.open += 1;
            state.opened.push(identity.clone());
            state.open_failures.pop_front()
        };
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
        }))
    }

    async fn secure_device(&self) -> Result<(), RemediationError> {
        let mut state = self.state();
        state.calls.secure_device += 1;
        state.remediation_failures.pop_front().map_or(Ok(()), Err)
    }
}

struct MemorySession {
    state: Arc<Mutex<State>>,
}

impl MemorySession {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyStoreSession for MemorySession {
    async fn list_keys(&self) -> Result<BTreeSet<String>, ListError> {
        let mut state = self.state();
        state.calls.list_keys += 1;
        if let Some(error) = state.list_failures.pop_front() {
            return Err(error);
        }
        Ok(state
            .entries
            .keys()
            .filter(|name| !state.legacy.contains(*name))
            .cloned()
            .collect())
    }

    async fn get(&self, name: &str) -> Result<String, ReadError> {
        let mut state = self.state();
        state.calls.get += 1;
        if let Some(error) = state.get_failures.pop_front() {
            return Err(error);
        }
        state.entries.get(name).cloned().ok_or(ReadError::NotFound)
    }

    async fn set(&self, name: &str, value: &str) -> Result<String, WriteError> {
        let mut state = self.state();
        state.calls.set += 1;
        if let Some(error) = state.set_failures.pop_front() {
            return Err(error);
        }
        state.legacy.remove(name);
        state.entries.insert(name.to_string(), value.to_string());
        state.writes.push((name.to_string(), value.to_string()));
        drop(state);
        Ok(name.to_string())
    }
}
