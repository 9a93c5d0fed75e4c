// src/memory_store.rs
//
// In-process ObjectStore. Behaves like a Swift account held in memory, with a
// call counter and failure injection so callers can exercise error paths.

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::constants::{BINARY_CONTENT_TYPE, MANIFEST_HEADER, METADATA_PREFIX};
use crate::credentials::Credentials;
use crate::error::{Result, StoreError};
use crate::naming::Metadata;
use crate::object_store::{AuthSession, BackendKind, ListEntry, ObjectStore};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    headers: Metadata,
}

#[derive(Debug, Default)]
struct State {
    // container -> key -> object; BTreeMap keeps listings sorted like Swift does
    containers: HashMap<String, BTreeMap<String, StoredObject>>,
    rejected: HashSet<String>,
    issued_token: Option<String>,
    auth_failure: Option<(u16, String)>,
}

/// In-memory object store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    calls: AtomicUsize,
    auth_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the given containers already present.
    pub fn with_buckets(buckets: &[&str]) -> Self {
        let store = Self::new();
        for b in buckets {
            store.create_bucket(b);
        }
        store
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| StoreError::Backend(anyhow!("memory store lock poisoned")))
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn create_bucket(&self, bucket: &str) {
        if let Ok(mut state) = self.lock() {
            state.containers.entry(bucket.to_string()).or_default();
        }
    }

    /// Every later `put`/`get` of `key` fails with a backend error.
    pub fn reject_key(&self, key: &str) {
        if let Ok(mut state) = self.lock() {
            state.rejected.insert(key.to_string());
        }
    }

    /// `authenticate` hands out this token instead of echoing the supplied one.
    pub fn issue_token(&self, token: &str) {
        if let Ok(mut state) = self.lock() {
            state.issued_token = Some(token.to_string());
        }
    }

    /// `authenticate` fails with `Connection { status, message }`.
    pub fn fail_auth(&self, status: u16, message: &str) {
        if let Ok(mut state) = self.lock() {
            state.auth_failure = Some((status, message.to_string()));
        }
    }

    /// Total trait calls so far, authentication included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::Relaxed)
    }

    /// Raw object bytes, bypassing the trait (and the call counter).
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let state = self.lock().ok()?;
        state.containers.get(bucket)?.get(key).map(|o| o.data.clone())
    }

    /// Keys stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .ok()
            .and_then(|s| s.containers.get(bucket).map(|c| c.keys().cloned().collect()))
            .unwrap_or_default()
    }

    /// Insert an object directly, e.g. a directory marker.
    pub fn insert_raw(&self, bucket: &str, key: &str, data: &[u8], content_type: &str, metadata: &Metadata) {
        if let Ok(mut state) = self.lock() {
            state.containers.entry(bucket.to_string()).or_default().insert(
                key.to_string(),
                StoredObject {
                    data: Bytes::copy_from_slice(data),
                    content_type: content_type.to_string(),
                    headers: metadata.clone(),
                },
            );
        }
    }

    fn check_rejected(state: &State, key: &str) -> Result<()> {
        if state.rejected.contains(key) {
            return Err(StoreError::Backend(anyhow!("backend rejected {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthSession> {
        self.count();
        self.auth_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.lock()?;
        if let Some((status, message)) = &state.auth_failure {
            return Err(StoreError::connection(Some(*status), message.clone()));
        }
        let (storage_url, supplied) = match credentials {
            Credentials::Password { tenant, .. } => (format!("memory://{tenant}"), None),
            Credentials::Token { storage_url, auth_token, .. } => (storage_url.clone(), Some(auth_token.clone())),
        };
        let auth_token = state
            .issued_token
            .clone()
            .or(supplied)
            .unwrap_or_else(|| "memory-token".to_string());
        Ok(AuthSession { storage_url, auth_token })
    }

    async fn list(&self, _session: &AuthSession, bucket: &str, prefix: &str) -> Result<Vec<ListEntry>> {
        self.count();
        let state = self.lock()?;
        let container = state
            .containers
            .get(bucket)
            .ok_or_else(|| StoreError::NotFound(format!("container {bucket}")))?;
        Ok(container
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, o)| ListEntry { name: k.clone(), content_type: o.content_type.clone(), bytes: o.data.len() as u64 })
            .collect())
    }

    async fn get(&self, _session: &AuthSession, bucket: &str, key: &str) -> Result<Bytes> {
        self.count();
        let state = self.lock()?;
        Self::check_rejected(&state, key)?;
        state
            .containers
            .get(bucket)
            .and_then(|c| c.get(key))
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::NotFound(format!("{bucket}/{key}")))
    }

    async fn put(
        &self,
        _session: &AuthSession,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        metadata: &Metadata,
    ) -> Result<()> {
        self.count();
        let mut state = self.lock()?;
        Self::check_rejected(&state, key)?;
        let container = state
            .containers
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NotFound(format!("container {bucket}")))?;
        container.insert(
            key.to_string(),
            StoredObject {
                data: body,
                content_type: content_type.unwrap_or(BINARY_CONTENT_TYPE).to_string(),
                headers: metadata.clone(),
            },
        );
        Ok(())
    }

    async fn head(&self, _session: &AuthSession, bucket: &str, key: &str) -> Result<Metadata> {
        self.count();
        let state = self.lock()?;
        let obj = state
            .containers
            .get(bucket)
            .and_then(|c| c.get(key))
            .ok_or_else(|| StoreError::NotFound(format!("{bucket}/{key}")))?;
        let mut headers = obj.headers.clone();
        headers.insert("content-type".into(), obj.content_type.clone());
        headers.insert("content-length".into(), obj.data.len().to_string());
        Ok(headers)
    }

    async fn post_metadata(&self, _session: &AuthSession, bucket: &str, key: &str, metadata: &Metadata) -> Result<()> {
        self.count();
        let mut state = self.lock()?;
        let obj = state
            .containers
            .get_mut(bucket)
            .and_then(|c| c.get_mut(key))
            .ok_or_else(|| StoreError::NotFound(format!("{bucket}/{key}")))?;
        // POST replaces the whole custom metadata set
        obj.headers.retain(|k, _| !k.starts_with(METADATA_PREFIX));
        obj.headers.extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn put_manifest(
        &self,
        _session: &AuthSession,
        bucket: &str,
        key: &str,
        segment_container: &str,
        segment_prefix: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        self.count();
        let mut state = self.lock()?;
        Self::check_rejected(&state, key)?;
        // Segments are joined at write time; a real store joins them on read.
        let mut joined = BytesMut::new();
        if let Some(segments) = state.containers.get(segment_container) {
            for (_, seg) in segments.iter().filter(|(k, _)| k.starts_with(segment_prefix)) {
                joined.extend_from_slice(&seg.data);
            }
        }
        let mut headers = metadata.clone();
        headers.insert(MANIFEST_HEADER.into(), format!("{segment_container}/{segment_prefix}"));
        let container = state
            .containers
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NotFound(format!("container {bucket}")))?;
        container.insert(
            key.to_string(),
            StoredObject { data: joined.freeze(), content_type: BINARY_CONTENT_TYPE.to_string(), headers },
        );
        Ok(())
    }

    async fn ensure_container(&self, _session: &AuthSession, bucket: &str) -> Result<()> {
        self.count();
        let mut state = self.lock()?;
        state.containers.entry(bucket.to_string()).or_default();
        Ok(())
    }
}
