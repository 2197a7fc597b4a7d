//! Common test utilities shared across integration tests.

#![allow(dead_code, missing_docs)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lskit_core::host::{Host, ScriptedHost};
use lskit_core::interceptor::{DatabaseOpener, OpenOptions};
use lskit_core::keystore::memory::MemoryKeyStore;
use lskit_core::KeyProvisioner;

pub fn provisioner(store: &MemoryKeyStore, host: &Arc<ScriptedHost>) -> KeyProvisioner {
    KeyProvisioner::new(Arc::new(store.clone()), Arc::clone(host) as Arc<dyn Host>)
}

#[derive(Debug, thiserror::Error)]
#[error("database refused to open: {0}")]
pub struct EngineError(pub String);

/// Database engine stand-in recording every open call.
#[derive(Debug, Default)]
pub struct RecordingOpener {
    calls: Mutex<Vec<OpenOptions>>,
    refuse: Mutex<Option<String>>,
}

impl RecordingOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing(reason: &str) -> Self {
        let opener = Self::new();
        *opener.refuse.lock().expect("lock") = Some(reason.to_string());
        opener
    }

    pub fn calls(&self) -> Vec<OpenOptions> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl DatabaseOpener for RecordingOpener {
    type Database = String;
    type Error = EngineError;

    async fn open_database(&self, options: OpenOptions) -> Result<String, EngineError> {
        let location = options.location.clone().unwrap_or_default();
        self.calls.lock().expect("lock").push(options);
        match self.refuse.lock().expect("lock").clone() {
            Some(reason) => Err(EngineError(reason)),
            None => Ok(location),
        }
    }
}
