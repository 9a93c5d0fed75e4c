// tests/common/mod.rs
//
// Shared fixtures: an in-memory store, a token-mode credential and a handle
// connected through them.

#![allow(dead_code)]

use std::sync::Arc;

use scistore::{Credentials, MemoryStore, MemoryTokenCache, StoreHandle};

pub const BUCKET: &str = "lab-data";

pub fn token_credentials() -> Credentials {
    Credentials::Token {
        auth_url: Some("https://keystone.example.org:5000/v2.0".into()),
        storage_url: "memory://lab".into(),
        auth_token: "tok".into(),
        tenant: "lab".into(),
    }
}

/// Fresh store with `BUCKET` created.
pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_buckets(&[BUCKET]))
}

pub async fn connect(store: Arc<MemoryStore>, prefix: &str) -> StoreHandle {
    let cache = MemoryTokenCache::new();
    StoreHandle::connect(store, &token_credentials(), &cache, BUCKET, prefix)
        .await
        .expect("memory store connect")
}
