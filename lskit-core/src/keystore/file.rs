//! File-backed keystore for development builds and the CLI.
//!
//! Each store identity maps to `<dir>/<store-name>.json`, a flat JSON object
//! of entry names to values. Writes go to a temporary file that is renamed
//! over the original, so a crash never leaves a half-written store behind.
//!
//! There is no device authentication and values are stored in plain text.
//! Never use this on a real device.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{AuthenticatedKeyStore, KeyStoreIdentity, KeyStoreSession};
use crate::error::{ListError, OpenError, ReadError, RemediationError, WriteError};

/// [`AuthenticatedKeyStore`] persisting entries as JSON files in a directory.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Creates a store rooted at `dir`. The directory is created on first open.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `identity`.
    #[must_use]
    pub fn path_for(&self, identity: &KeyStoreIdentity) -> PathBuf {
        self.dir.join(format!("{}.json", identity.as_str()))
    }
}

#[async_trait]
impl AuthenticatedKeyStore for FileKeyStore {
    async fn open(
        &self,
        identity: &KeyStoreIdentity,
    ) -> Result<Box<dyn KeyStoreSession>, OpenError> {
        if identity.as_str().is_empty()
            || identity.as_str().contains(['/', '\\'])
            || identity.as_str().starts_with('.')
        {
            return Err(OpenError::Other {
                code: None,
                message: format!("invalid store name {identity:?}"),
            });
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| io_open_error(&self.dir, &err))?;
        let path = self.path_for(identity);
        let entries = load(&path).await?;
        log::debug!(
            "opened file keystore {} with {} entries",
            path.display(),
            entries.len()
        );
        Ok(Box::new(FileSession {
            path,
            entries: Mutex::new(entries),
        }))
    }

    async fn secure_device(&self) -> Result<(), RemediationError> {
        Ok(())
    }
}

struct FileSession {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

#[async_trait]
impl KeyStoreSession for FileSession {
    async fn list_keys(&self) -> Result<BTreeSet<String>, ListError> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }

    async fn get(&self, name: &str) -> Result<String, ReadError> {
        self.entries
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or(ReadError::NotFound)
    }

    async fn set(&self, name: &str, value: &str) -> Result<String, WriteError> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(name.to_string(), value.to_string());
        store(&self.path, &next).await?;
        *entries = next;
        drop(entries);
        Ok(name.to_string())
    }
}

async fn load(path: &Path) -> Result<BTreeMap<String, String>, OpenError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| OpenError::Other {
            code: None,
            message: format!("corrupted keystore file {}: {err}", path.display()),
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(io_open_error(path, &err)),
    }
}

async fn store(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), WriteError> {
    let bytes = serde_json::to_vec_pretty(entries)
        .map_err(|err| WriteError(format!("serialization failed: {err}")))?;
    let tmp = path.with_extension("json.tmp");
    let write_err = |err: std::io::Error| WriteError(format!("write {}: {err}", tmp.display()));
    let mut file = File::create(&tmp).await.map_err(write_err)?;
    file.write_all(&bytes).await.map_err(write_err)?;
    // The rename must not become visible before the contents are on disk.
    file.sync_all().await.map_err(write_err)?;
    drop(file);
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|err| WriteError(format!("rename {}: {err}", path.display())))
}

fn io_open_error(path: &Path, err: &std::io::Error) -> OpenError {
    OpenError::Other {
        code: None,
        message: format!("{}: {err}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyStore::new(dir.path().join("keys"));
        let identity = KeyStoreIdentity::default();

        let session = store.open(&identity).await.expect("open");
        assert!(session.list_keys().await.expect("list").is_empty());
        assert_eq!(
            session.set("lsk", "K1").await.expect("set"),
            "lsk".to_string()
        );
        drop(session);

        let reopened = FileKeyStore::new(dir.path().join("keys"));
        let session = reopened.open(&identity).await.expect("reopen");
        assert!(session.list_keys().await.expect("list").contains("lsk"));
        assert_eq!(session.get("lsk").await.expect("get"), "K1");
        assert_eq!(session.get("other").await, Err(ReadError::NotFound));
        assert!(store.path_for(&identity).exists());
    }

    #[tokio::test]
    async fn test_set_is_on_disk_before_returning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyStore::new(dir.path());
        let identity = KeyStoreIdentity::default();
        let session = store.open(&identity).await.expect("open");
        session.set("lsk", "K1").await.expect("set");

        let path = store.path_for(&identity);
        let on_disk: BTreeMap<String, String> =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("parse");
        assert_eq!(on_disk.get("lsk").map(String::as_str), Some("K1"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyStore::new(dir.path());
        let identity = KeyStoreIdentity::default();
        let session = store.open(&identity).await.expect("open");
        session.set("lsk", "K1").await.expect("set");

        // A directory squatting on the temp path makes the next write fail.
        let tmp = store.path_for(&identity).with_extension("json.tmp");
        std::fs::create_dir(&tmp).expect("mkdir");
        assert!(session.set("lsk", "K2").await.is_err());
        assert_eq!(session.get("lsk").await.expect("get"), "K1");
    }

    #[tokio::test]
    async fn test_identities_are_isolated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyStore::new(dir.path());
        let a = store.open(&KeyStoreIdentity::new("a")).await.expect("open a");
        a.set("lsk", "A").await.expect("set");
        let b = store.open(&KeyStoreIdentity::new("b")).await.expect("open b");
        assert_eq!(b.get("lsk").await, Err(ReadError::NotFound));
    }

    #[tokio::test]
    async fn test_corrupted_file_fails_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyStore::new(dir.path());
        let identity = KeyStoreIdentity::new("broken");
        std::fs::write(store.path_for(&identity), b"not json").expect("write");
        assert!(matches!(
            store.open(&identity).await,
            Err(OpenError::Other { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyStore::new(dir.path());
        assert!(store.open(&KeyStoreIdentity::new("../x")).await.is_err());
        assert!(store.open(&KeyStoreIdentity::new("")).await.is_err());
    }
}
