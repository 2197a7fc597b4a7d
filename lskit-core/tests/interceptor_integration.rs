//! Key injection into database open calls.

mod common;

use std::sync::Arc;

use lskit_core::host::ScriptedHost;
use lskit_core::interceptor::{DatabaseOpener, InterceptError, KeyedDatabaseOpener, OpenOptions};
use lskit_core::keystore::memory::MemoryKeyStore;
use lskit_core::keystore::DEFAULT_ENTRY_NAME;
use lskit_core::{FatalReason, OpenError, ProvisioningError};

use common::RecordingOpener;

fn keyed(store: &MemoryKeyStore, host: &Arc<ScriptedHost>) -> KeyedDatabaseOpener<RecordingOpener> {
    KeyedDatabaseOpener::new(
        RecordingOpener::new(),
        Arc::new(common::provisioner(store, host)),
    )
}

#[tokio::test]
async fn test_explicit_key_passes_through() {
    let store = MemoryKeyStore::new();
    let host = Arc::new(ScriptedHost::new());
    let opener = keyed(&store, &host);

    let options = OpenOptions::new().with_key("abc123");
    opener.open_database(options.clone()).await.expect("open");

    assert_eq!(
        opener.unkeyed().calls(),
        vec![OpenOptions::new().with_key("abc123").with_location("default")]
    );
    assert_eq!(store.calls().total(), 0);
    assert_eq!(options.location, None);
}

#[tokio::test]
async fn test_empty_explicit_key_passes_through() {
    let store = MemoryKeyStore::new();
    let host = Arc::new(ScriptedHost::new());
    let opener = keyed(&store, &host);

    opener
        .open_database(OpenOptions::new().with_key("").with_location("Library"))
        .await
        .expect("open");

    let calls = opener.unkeyed().calls();
    assert_eq!(calls[0].key.as_deref(), Some(""));
    assert_eq!(calls[0].location.as_deref(), Some("Library"));
    assert_eq!(store.calls().total(), 0);
}

#[tokio::test]
async fn test_missing_key_is_injected() {
    let store = MemoryKeyStore::with_entry(DEFAULT_ENTRY_NAME, "K1");
    let host = Arc::new(ScriptedHost::new());
    let opener = keyed(&store, &host);

    let location = opener.open_database(OpenOptions::new()).await.expect("open");

    assert_eq!(location, "default");
    assert_eq!(
        opener.unkeyed().calls(),
        vec![OpenOptions::new().with_key("K1").with_location("default")]
    );
}

#[tokio::test]
async fn test_injection_keeps_other_fields() {
    let store = MemoryKeyStore::with_entry(DEFAULT_ENTRY_NAME, "K1");
    let host = Arc::new(ScriptedHost::new());
    let opener = keyed(&store, &host);

    let options = OpenOptions::new()
        .with_field("name", "app.db")
        .with_location("Documents");
    opener.open_database(options.clone()).await.expect("open");

    let calls = opener.unkeyed().calls();
    assert_eq!(calls[0].extra, options.extra);
    assert_eq!(calls[0].location.as_deref(), Some("Documents"));
    assert_eq!(calls[0].key.as_deref(), Some("K1"));
    assert_eq!(options.key, None);
}

#[tokio::test]
async fn test_provisioning_failure_skips_engine() {
    let store = MemoryKeyStore::new();
    store.fail_next_open(OpenError::AuthSkipped);
    let host = Arc::new(ScriptedHost::new());
    let opener = keyed(&store, &host);

    let err = opener
        .open_database(OpenOptions::new())
        .await
        .expect_err("fatal");
    assert!(matches!(
        err,
        InterceptError::Provisioning(ProvisioningError::Terminated(
            FatalReason::AuthenticationSkipped
        ))
    ));
    assert!(opener.unkeyed().calls().is_empty());
}

#[tokio::test]
async fn test_engine_failure_is_reported() {
    let store = MemoryKeyStore::with_entry(DEFAULT_ENTRY_NAME, "K1");
    let host = Arc::new(ScriptedHost::new());
    let opener = KeyedDatabaseOpener::new(
        RecordingOpener::refusing("file is not a database"),
        Arc::new(common::provisioner(&store, &host)),
    );

    let err = opener
        .open_database(OpenOptions::new())
        .await
        .expect_err("engine fails");
    assert!(matches!(err, InterceptError::Database(_)));
    assert!(err.to_string().contains("file is not a database"));
}

#[test]
fn test_features_mark_sqlcipher() {
    let store = MemoryKeyStore::new();
    let host = Arc::new(ScriptedHost::new());
    assert!(keyed(&store, &host).features().is_sqlcipher);
}
