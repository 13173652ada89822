#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crm_contracts::access::{AccessGateState, ACCESS_AUTHORIZATION_STORAGE_KEY};
use crm_contracts::documents::{CollectionId, DatabaseId};
use crm_contracts::UnixTimeMs;
use crm_engines::document_store::{Document, InMemoryDocumentStore};
use crm_os::access_gate::{AccessGate, AccessGateConfig};
use crm_storage::{FileKeyValueStore, KeyValueStore};
use serde_json::{json, Value};

fn temp_store_path(name: &str) -> (PathBuf, PathBuf) {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    let base = std::env::temp_dir().join(format!("crm-gate-wiring-{name}-{suffix}"));
    let path = base.join("local_store.json");
    (base, path)
}

fn config(window_ms: u64) -> AccessGateConfig {
    AccessGateConfig::new(
        DatabaseId::new("crm").unwrap(),
        CollectionId::new("access_codes").unwrap(),
        window_ms,
    )
    .unwrap()
}

fn codes(cfg: &AccessGateConfig, values: &[&str]) -> InMemoryDocumentStore {
    let mut store = InMemoryDocumentStore::new();
    for (i, v) in values.iter().enumerate() {
        let Value::Object(fields) = json!({ "code": v, "label": "front desk" }) else {
            unreachable!()
        };
        store.insert_document(
            &cfg.database_id,
            &cfg.access_code_collection_id,
            Document::new(format!("ac_{i}"), fields),
        );
    }
    store
}

#[test]
fn at_gate_db_01_authorization_survives_restart_within_window() {
    let (base, path) = temp_store_path("restart");
    let cfg = config(60_000);

    let mut first = AccessGate::new(
        cfg.clone(),
        codes(&cfg, &["boutique-2024"]),
        FileKeyValueStore::for_path(path.clone()),
        UnixTimeMs(1_000),
    );
    assert!(first.verify_access_code("boutique-2024", UnixTimeMs(1_000)));
    drop(first);

    let second = AccessGate::new(
        cfg.clone(),
        codes(&cfg, &["boutique-2024"]),
        FileKeyValueStore::for_path(path.clone()),
        UnixTimeMs(30_000),
    );
    assert_eq!(second.state(), AccessGateState::Authorized);
    assert_eq!(second.authorized_until(), Some(UnixTimeMs(61_000)));
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_gate_db_02_restart_after_window_clears_file_entry() {
    let (base, path) = temp_store_path("expired");
    let cfg = config(1_000);

    let mut first = AccessGate::new(
        cfg.clone(),
        codes(&cfg, &["open"]),
        FileKeyValueStore::for_path(path.clone()),
        UnixTimeMs(0),
    );
    assert!(first.verify_access_code("open", UnixTimeMs(0)));

    let second = AccessGate::new(
        cfg.clone(),
        codes(&cfg, &["open"]),
        FileKeyValueStore::for_path(path.clone()),
        UnixTimeMs(1_500),
    );
    assert!(!second.is_authorized());
    let reader = FileKeyValueStore::for_path(path);
    assert_eq!(reader.get(ACCESS_AUTHORIZATION_STORAGE_KEY).unwrap(), None);
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_gate_db_03_corrupt_entry_in_file_is_removed() {
    let (base, path) = temp_store_path("corrupt");
    let cfg = config(1_000);
    let mut seed = FileKeyValueStore::for_path(path.clone());
    seed.set(ACCESS_AUTHORIZATION_STORAGE_KEY, "{{garbage").unwrap();
    seed.set("unrelated", "kept").unwrap();

    let gate = AccessGate::new(
        cfg.clone(),
        codes(&cfg, &[]),
        FileKeyValueStore::for_path(path.clone()),
        UnixTimeMs(10),
    );
    assert!(!gate.is_authorized());
    let reader = FileKeyValueStore::for_path(path);
    assert_eq!(reader.get(ACCESS_AUTHORIZATION_STORAGE_KEY).unwrap(), None);
    assert_eq!(reader.get("unrelated").unwrap().as_deref(), Some("kept"));
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_gate_db_04_reset_removes_file_entry() {
    let (base, path) = temp_store_path("reset");
    let cfg = config(60_000);
    let mut gate = AccessGate::new(
        cfg.clone(),
        codes(&cfg, &["open"]),
        FileKeyValueStore::for_path(path.clone()),
        UnixTimeMs(0),
    );
    assert!(gate.verify_access_code("open", UnixTimeMs(5)));
    gate.reset_authorization();

    let reopened = AccessGate::new(
        cfg.clone(),
        codes(&cfg, &["open"]),
        FileKeyValueStore::for_path(path),
        UnixTimeMs(6),
    );
    assert!(!reopened.is_authorized());
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_gate_db_05_corrupt_store_file_heals_and_persists_again() {
    let (base, path) = temp_store_path("corrupt-file");
    fs::create_dir_all(&base).unwrap();
    fs::write(&path, "{truncated").unwrap();
    let cfg = config(60_000);

    let mut first = AccessGate::new(
        cfg.clone(),
        codes(&cfg, &["open"]),
        FileKeyValueStore::for_path(path.clone()),
        UnixTimeMs(1),
    );
    assert!(!first.is_authorized());
    assert_eq!(
        FileKeyValueStore::for_path(path.clone())
            .get(ACCESS_AUTHORIZATION_STORAGE_KEY)
            .unwrap(),
        None
    );
    assert!(first.verify_access_code("open", UnixTimeMs(1)));
    drop(first);

    let second = AccessGate::new(
        cfg.clone(),
        codes(&cfg, &["open"]),
        FileKeyValueStore::for_path(path),
        UnixTimeMs(2),
    );
    assert!(second.is_authorized());
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_gate_db_06_corrupt_file_written_after_start_heals_on_verify() {
    let (base, path) = temp_store_path("corrupt-late");
    let cfg = config(60_000);
    let mut gate = AccessGate::new(
        cfg.clone(),
        codes(&cfg, &["open"]),
        FileKeyValueStore::for_path(path.clone()),
        UnixTimeMs(1),
    );
    fs::create_dir_all(&base).unwrap();
    fs::write(&path, "{truncated").unwrap();
    assert!(gate.verify_access_code("open", UnixTimeMs(1)));

    let reopened = AccessGate::new(
        cfg.clone(),
        codes(&cfg, &["open"]),
        FileKeyValueStore::for_path(path),
        UnixTimeMs(2),
    );
    assert!(reopened.is_authorized());
    fs::remove_dir_all(base).unwrap();
}
