//! Basic store scenarios: put/get, growth, reopen, delete, shutdown.

use fennec_store::{record, Store, StoreError};
use std::fs::OpenOptions;
use std::io::Write;
use tempfile::TempDir;

const PAIRS: [(&str, &str); 4] = [("k1", "v1"), ("k2", "v2"), ("k3", "v3"), ("k2", "v2.1")];

#[test]
fn put_then_get_returns_the_latest_value() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    for (key, value) in PAIRS {
        store.put(key, value).unwrap();
        assert_eq!(store.get(key).unwrap(), value);
    }

    assert_eq!(store.get("k1").unwrap(), "v1");
    assert_eq!(store.get("k2").unwrap(), "v2.1");
    assert_eq!(store.get("k3").unwrap(), "v3");
}

#[test]
fn size_grows_with_every_put() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let mut previous = store.size().unwrap();
    for (key, value) in PAIRS {
        store.put(key, value).unwrap();
        let size = store.size().unwrap();
        assert!(
            size > previous,
            "size did not grow after put (before {}, after {})",
            previous,
            size
        );
        previous = size;
    }
}

#[test]
fn reopen_restores_every_key() {
    let dir = TempDir::new().unwrap();

    {
        let store = Store::open(dir.path()).unwrap();
        for (key, value) in PAIRS {
            store.put(key, value).unwrap();
        }
        store.close().unwrap();
    }

    let store = Store::open(dir.path()).unwrap();
    assert_eq!(store.get("k1").unwrap(), "v1");
    assert_eq!(store.get("k2").unwrap(), "v2.1");
    assert_eq!(store.get("k3").unwrap(), "v3");
}

#[test]
fn absent_key_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    assert!(matches!(store.get("absent"), Err(StoreError::NotFound)));
}

#[test]
fn delete_hides_a_key_until_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let store = Store::open(dir.path()).unwrap();
        store.put("test_key", "test_value").unwrap();
        assert_eq!(store.get("test_key").unwrap(), "test_value");

        store.delete("test_key").unwrap();
        assert!(matches!(store.get("test_key"), Err(StoreError::NotFound)));

        // Deleting a key that was never written succeeds.
        store.delete("non_existent_key").unwrap();
        store.close().unwrap();
    }

    // No tombstone is logged, so recovery brings the key back.
    let store = Store::open(dir.path()).unwrap();
    assert_eq!(store.get("test_key").unwrap(), "test_value");
}

#[test]
fn put_after_close_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    store.put("k1", "v1").unwrap();
    store.close().unwrap();

    assert!(matches!(store.put("k2", "v2"), Err(StoreError::Closed)));

    // Reads keep working from the index and the files on disk.
    assert_eq!(store.get("k1").unwrap(), "v1");
}

#[test]
fn close_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    store.close().unwrap();
    store.close().unwrap();
}

#[test]
fn oversized_put_fails_without_changing_state() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let key = "k".repeat(record::MAX_KEY_LEN + 1);
    assert!(matches!(
        store.put(&key, "v"),
        Err(StoreError::RecordTooLarge { .. })
    ));

    assert_eq!(store.size().unwrap(), 0);
    assert!(matches!(store.get(&key), Err(StoreError::NotFound)));
}

#[test]
fn torn_tail_fails_the_next_open() {
    let dir = TempDir::new().unwrap();

    {
        let store = Store::open(dir.path()).unwrap();
        store.put("k1", "v1").unwrap();
        store.close().unwrap();
    }

    let current = dir.path().join("current-data");
    let mut file = OpenOptions::new().append(true).open(&current).unwrap();
    file.write_all(&[0x01, 0x02, 0x03]).unwrap();
    drop(file);

    match Store::open(dir.path()) {
        Err(StoreError::Corruption { path }) => assert_eq!(path, current),
        other => panic!("expected Corruption, got {:?}", other.map(|_| ())),
    }
}
