// src/object_store.rs
//
// Pluggable object-store abstraction.
// One capability trait, one implementation per provider:
//   Swift  - swift_client.rs (reference transport)
//   S3, Google, Azure - declared, every call returns `Unimplemented` until a transport exists
//   Memory - memory_store.rs, in-process store used by tests

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use crate::credentials::Credentials;
use crate::error::{Result, StoreError};
use crate::naming::Metadata;
use crate::swift_client::{SwiftConfig, SwiftStore};

/// Storage provider variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Swift,
    S3,
    Google,
    Azure,
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Swift => "swift",
            BackendKind::S3 => "s3",
            BackendKind::Google => "google",
            BackendKind::Azure => "azure",
            BackendKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "swift" => Ok(BackendKind::Swift),
            "s3" => Ok(BackendKind::S3),
            "google" | "gcs" | "gs" => Ok(BackendKind::Google),
            "azure" | "az" => Ok(BackendKind::Azure),
            "memory" | "mem" => Ok(BackendKind::Memory),
            _ => Err(StoreError::InvalidConfig(format!("unknown backend '{s}' (expected swift, s3, google, azure)"))),
        }
    }
}

/// Storage endpoint and token obtained from one authentication round trip.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub storage_url: String,
    pub auth_token: String,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("storage_url", &self.storage_url)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub content_type: String,
    pub bytes: u64,
}

/// Capability interface every provider implements.
///
/// Metadata maps crossing this trait are in *provider* form (reserved prefix present);
/// the façade owns the conversion to and from user form.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// One authentication round trip. May return a refreshed token.
    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthSession>;

    /// Full listing of `bucket` under `prefix` (pagination handled internally).
    async fn list(&self, session: &AuthSession, bucket: &str, prefix: &str) -> Result<Vec<ListEntry>>;

    async fn get(&self, session: &AuthSession, bucket: &str, key: &str) -> Result<Bytes>;

    async fn put(
        &self,
        session: &AuthSession,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        metadata: &Metadata,
    ) -> Result<()>;

    /// Headers of an object, lower-cased names.
    async fn head(&self, session: &AuthSession, bucket: &str, key: &str) -> Result<Metadata>;

    /// Replace the custom metadata of an existing object.
    async fn post_metadata(&self, session: &AuthSession, bucket: &str, key: &str, metadata: &Metadata) -> Result<()>;

    /// Write a manifest object whose content is the concatenation of every
    /// object under `segment_container/segment_prefix`.
    async fn put_manifest(
        &self,
        session: &AuthSession,
        bucket: &str,
        key: &str,
        segment_container: &str,
        segment_prefix: &str,
        metadata: &Metadata,
    ) -> Result<()>;

    /// Whether `put` attaches metadata itself; when false the façade follows up with `post_metadata`.
    fn supports_put_metadata(&self) -> bool {
        true
    }

    /// Create a container if missing.
    async fn ensure_container(&self, session: &AuthSession, bucket: &str) -> Result<()>;
}

/// Placeholder for providers without a transport yet. Keeps the interface uniform.
#[derive(Debug, Clone, Copy)]
pub struct PendingStore {
    kind: BackendKind,
}

impl PendingStore {
    pub fn new(kind: BackendKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ObjectStore for PendingStore {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn authenticate(&self, _credentials: &Credentials) -> Result<AuthSession> {
        Err(StoreError::Unimplemented(self.kind))
    }

    async fn list(&self, _session: &AuthSession, _bucket: &str, _prefix: &str) -> Result<Vec<ListEntry>> {
        Err(StoreError::Unimplemented(self.kind))
    }

    async fn get(&self, _session: &AuthSession, _bucket: &str, _key: &str) -> Result<Bytes> {
        Err(StoreError::Unimplemented(self.kind))
    }

    async fn put(
        &self,
        _session: &AuthSession,
        _bucket: &str,
        _key: &str,
        _body: Bytes,
        _content_type: Option<&str>,
        _metadata: &Metadata,
    ) -> Result<()> {
        Err(StoreError::Unimplemented(self.kind))
    }

    async fn head(&self, _session: &AuthSession, _bucket: &str, _key: &str) -> Result<Metadata> {
        Err(StoreError::Unimplemented(self.kind))
    }

    async fn post_metadata(&self, _session: &AuthSession, _bucket: &str, _key: &str, _metadata: &Metadata) -> Result<()> {
        Err(StoreError::Unimplemented(self.kind))
    }

    async fn put_manifest(
        &self,
        _session: &AuthSession,
        _bucket: &str,
        _key: &str,
        _segment_container: &str,
        _segment_prefix: &str,
        _metadata: &Metadata,
    ) -> Result<()> {
        Err(StoreError::Unimplemented(self.kind))
    }

    async fn ensure_container(&self, _session: &AuthSession, _bucket: &str) -> Result<()> {
        Err(StoreError::Unimplemented(self.kind))
    }
}

/// Convenience factory that picks a transport for a provider.
pub fn store_for_backend(kind: BackendKind, swift: SwiftConfig) -> Result<Arc<dyn ObjectStore>> {
    match kind {
        BackendKind::Swift => Ok(Arc::new(SwiftStore::new(swift)?)),
        BackendKind::Memory => Ok(Arc::new(crate::memory_store::MemoryStore::new())),
        other => Ok(Arc::new(PendingStore::new(other))),
    }
}
