#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crm_storage::{FileKeyValueStore, KeyValueStore, LocalStoreError};

fn temp_base(name: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    std::env::temp_dir().join(format!("crm-local-store-test-{name}-{suffix}"))
}

#[test]
fn at_file_store_01_missing_file_reads_as_empty() {
    let base = temp_base("missing");
    let store = FileKeyValueStore::for_path(base.join("store.json"));
    assert_eq!(store.get("accessCodeVerified").unwrap(), None);
    assert!(!base.exists());
}

#[test]
fn at_file_store_02_values_survive_reopen() {
    let base = temp_base("reopen");
    let path = base.join("nested").join("store.json");
    let mut store = FileKeyValueStore::for_path(path.clone());
    store
        .set("accessCodeVerified", r#"{"verified":true,"timestamp":5}"#)
        .unwrap();

    let reopened = FileKeyValueStore::for_path(path.clone());
    assert_eq!(
        reopened.get("accessCodeVerified").unwrap().as_deref(),
        Some(r#"{"verified":true,"timestamp":5}"#)
    );
    assert!(!path.with_extension("tmp").exists());
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_file_store_03_delete_reports_presence() {
    let base = temp_base("delete");
    let mut store = FileKeyValueStore::for_path(base.join("store.json"));
    assert!(!store.delete("k").unwrap());
    store.set("k", "v").unwrap();
    store.set("other", "w").unwrap();
    assert!(store.delete("k").unwrap());
    assert!(!store.delete("k").unwrap());
    assert_eq!(store.get("other").unwrap().as_deref(), Some("w"));
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_file_store_04_corrupt_document_surfaces_json_error() {
    let base = temp_base("corrupt");
    fs::create_dir_all(&base).unwrap();
    let path = base.join("store.json");
    fs::write(&path, "{not json").unwrap();
    let store = FileKeyValueStore::for_path(path);
    assert!(matches!(store.get("k"), Err(LocalStoreError::Json(_))));
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_file_store_05_unknown_schema_version_fails_closed() {
    let base = temp_base("schema");
    fs::create_dir_all(&base).unwrap();
    let path = base.join("store.json");
    fs::write(&path, r#"{"schema_version":9,"entries":{}}"#).unwrap();
    let store = FileKeyValueStore::for_path(path);
    assert!(matches!(
        store.get("k"),
        Err(LocalStoreError::SchemaVersion(9))
    ));
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_file_store_06_set_replaces_corrupt_document() {
    let base = temp_base("heal-set");
    fs::create_dir_all(&base).unwrap();
    let path = base.join("store.json");
    fs::write(&path, "{truncated").unwrap();

    let mut store = FileKeyValueStore::for_path(path.clone());
    store.set("k", "v").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    assert!(!path.with_extension("tmp").exists());
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_file_store_07_delete_resets_foreign_schema_document() {
    let base = temp_base("heal-delete");
    fs::create_dir_all(&base).unwrap();
    let path = base.join("store.json");
    fs::write(&path, r#"{"schema_version":9,"entries":{"k":"v"}}"#).unwrap();

    let mut store = FileKeyValueStore::for_path(path);
    assert!(!store.delete("k").unwrap());
    assert_eq!(store.get("k").unwrap(), None);
    assert!(!store.delete("k").unwrap());
    fs::remove_dir_all(base).unwrap();
}
