// src/connection.rs
//
// Store handles. A handle is immutable once built: the session obtained at
// connect time never changes, and a token refresh means connecting again.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialSource, Credentials, resolve};
use crate::error::{Result, StoreError};
use crate::naming::clean_prefix;
use crate::object_store::{AuthSession, BackendKind, ObjectStore, store_for_backend};
use crate::swift_client::SwiftConfig;
use crate::token_cache::{FileTokenCache, MemoryTokenCache, TokenCache};

#[derive(Clone)]
pub(crate) enum ConnectionState {
    Connected(AuthSession),
    Failed(String),
}

/// A connected (or permanently failed) view of one bucket and virtual folder.
#[derive(Clone)]
pub struct StoreHandle {
    pub(crate) bucket: String,
    pub(crate) prefix: String,
    pub(crate) tenant: String,
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) state: ConnectionState,
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("StoreHandle");
        d.field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("tenant", &self.tenant)
            .field("backend", &self.store.kind());
        match &self.state {
            ConnectionState::Connected(session) => d.field("storage_url", &session.storage_url),
            ConnectionState::Failed(reason) => d.field("failed", reason),
        };
        d.finish()
    }
}

impl StoreHandle {
    /// Authenticate once and bind the result to `bucket`/`prefix`.
    ///
    /// When the provider returns a token different from the supplied one, it is
    /// written to `cache` keyed by the auth endpoint host and tenant. Cache write
    /// failures are logged, never fatal.
    pub async fn connect(
        store: Arc<dyn ObjectStore>,
        credentials: &Credentials,
        cache: &dyn TokenCache,
        bucket: &str,
        prefix: &str,
    ) -> Result<Self> {
        let session = store.authenticate(credentials).await.map_err(|e| match e {
            e @ (StoreError::Connection { .. } | StoreError::Unimplemented(_) | StoreError::InvalidConfig(_)) => e,
            other => StoreError::connection(None, other.to_string()),
        })?;

        if credentials.supplied_token() != Some(session.auth_token.as_str()) {
            let host = credentials.cache_host();
            match cache.write(&host, credentials.tenant(), &session.auth_token, &session.storage_url) {
                Ok(()) => debug!("cached new auth token for {}/{}", host, credentials.tenant()),
                Err(e) => warn!("could not cache auth token for {}/{}: {}", host, credentials.tenant(), e),
            }
        }

        info!("connected to {} bucket {} (prefix '{}')", store.kind(), bucket, clean_prefix(prefix));
        Ok(Self {
            bucket: bucket.to_string(),
            prefix: clean_prefix(prefix),
            tenant: credentials.tenant().to_string(),
            store,
            state: ConnectionState::Connected(session),
        })
    }

    /// Like [`connect`](Self::connect) but never fails: a failed connect yields a
    /// handle whose every operation returns `NotConnected` without touching the network.
    pub async fn open(
        store: Arc<dyn ObjectStore>,
        credentials: &Credentials,
        cache: &dyn TokenCache,
        bucket: &str,
        prefix: &str,
    ) -> Self {
        match Self::connect(store.clone(), credentials, cache, bucket, prefix).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("connection error: {}", e);
                Self::disconnected(store, credentials.tenant(), bucket, prefix, e.to_string())
            }
        }
    }

    /// Handle in the permanently failed state.
    pub fn disconnected(
        store: Arc<dyn ObjectStore>,
        tenant: &str,
        bucket: &str,
        prefix: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix: clean_prefix(prefix),
            tenant: tenant.to_string(),
            store,
            state: ConnectionState::Failed(reason.into()),
        }
    }

    /// Resolve credentials from the environment and the default `~/.swift` cache,
    /// then connect to a backend. Credential problems are returned before any network call.
    pub async fn from_env(kind: BackendKind, bucket: &str, prefix: &str) -> Result<Self> {
        let cache = cache_or_memory(FileTokenCache::default_location());
        let credentials = resolve(&CredentialSource::from_env(), cache.as_ref())?;
        let store = store_for_backend(kind, SwiftConfig::from_env())?;
        Self::connect(store, &credentials, cache.as_ref(), bucket, prefix).await
    }

    /// Fresh handle for the same bucket/prefix, e.g. after a token expired.
    pub async fn reconnect(&self, credentials: &Credentials, cache: &dyn TokenCache) -> Result<Self> {
        Self::connect(self.store.clone(), credentials, cache, &self.bucket, &self.prefix).await
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn backend(&self) -> BackendKind {
        self.store.kind()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }

    pub fn storage_url(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Connected(session) => Some(&session.storage_url),
            ConnectionState::Failed(_) => None,
        }
    }

    /// The live session, or the original connect failure.
    pub(crate) fn session(&self) -> Result<&AuthSession> {
        match &self.state {
            ConnectionState::Connected(session) => Ok(session),
            ConnectionState::Failed(reason) => Err(StoreError::NotConnected { reason: reason.clone() }),
        }
    }
}

/// Without a usable cache directory tokens are only kept for this process.
fn cache_or_memory(location: Result<FileTokenCache>) -> Box<dyn TokenCache> {
    match location {
        Ok(cache) => Box::new(cache),
        Err(e) => {
            warn!("token cache unavailable ({}), keeping tokens in memory", e);
            Box::new(MemoryTokenCache::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;

    fn token_creds(token: &str) -> Credentials {
        Credentials::Token {
            auth_url: Some("https://keystone.example.org/v2.0".into()),
            storage_url: "memory://lab".into(),
            auth_token: token.into(),
            tenant: "lab".into(),
        }
    }

    #[tokio::test]
    async fn unchanged_token_is_not_cached() {
        let store = Arc::new(MemoryStore::with_buckets(&["b"]));
        let cache = MemoryTokenCache::new();
        let handle = StoreHandle::connect(store, &token_creds("tok"), &cache, "b", "/p/").await.unwrap();
        assert!(handle.is_connected());
        assert_eq!(handle.prefix(), "p");
        assert_eq!(cache.writes(), 0);
    }

    #[tokio::test]
    async fn refreshed_token_is_written_back() {
        let store = Arc::new(MemoryStore::with_buckets(&["b"]));
        store.issue_token("fresh");
        let cache = MemoryTokenCache::new();
        StoreHandle::connect(store, &token_creds("stale"), &cache, "b", "").await.unwrap();

        let entry = cache.read("keystone.example.org", "lab").unwrap().unwrap();
        assert_eq!(entry.token, "fresh");
        assert_eq!(entry.storage_url, "memory://lab");
    }

    #[tokio::test]
    async fn failed_open_fails_fast() {
        let store = Arc::new(MemoryStore::with_buckets(&["b"]));
        store.fail_auth(401, "Unauthorized");
        let cache = MemoryTokenCache::new();
        let handle = StoreHandle::open(store.clone(), &token_creds("tok"), &cache, "b", "").await;
        assert!(!handle.is_connected());
        assert_eq!(handle.storage_url(), None);
        match handle.session() {
            Err(StoreError::NotConnected { reason }) => assert!(reason.contains("401")),
            other => panic!("expected NotConnected, got {other:?}"),
        }
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn missing_home_falls_back_to_memory_cache() {
        let cache = cache_or_memory(Err(StoreError::InvalidConfig("HOME environment variable not set".into())));
        let source = CredentialSource::default()
            .with_auth_url("https://keystone.example.org/v2.0")
            .with_username("me")
            .with_password("secret")
            .with_tenant("lab");
        let credentials = resolve(&source, cache.as_ref()).unwrap();

        let store = Arc::new(MemoryStore::with_buckets(&["b"]));
        let handle = StoreHandle::connect(store, &credentials, cache.as_ref(), "b", "").await.unwrap();
        assert!(handle.is_connected());

        let entry = cache.read("keystone.example.org", "lab").unwrap().unwrap();
        assert_eq!(entry.token, "memory-token");
    }

    #[test]
    fn resolvable_location_keeps_the_file_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = cache_or_memory(Ok(FileTokenCache::new(dir.path())));
        cache.write("h", "t", "tok", "url").unwrap();
        assert!(dir.path().join("auth_token_h_v2_t.json").exists());
    }
}
