#![forbid(unsafe_code)]

pub mod local_store;

pub use local_store::{FileKeyValueStore, InMemoryKeyValueStore, KeyValueStore, LocalStoreError};
