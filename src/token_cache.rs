// src/token_cache.rs
//
// Best-effort persistence of the last auth token + storage URL per (auth host, tenant).
//
// On disk every entry is a single JSON record replaced through a temp file and an
// atomic rename, so a crash mid-write never pairs a new token with a stale URL.
// The legacy two-file layout (`auth_token_<host>_v2_<tenant>` + `storageurl_<host>_v2_<tenant>`)
// is still read when no record exists.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::constants::{DEFAULT_TOKEN_CACHE_DIR, ENV_TOKEN_CACHE_DIR};
use crate::error::{Result, StoreError};

/// One persisted cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub host: String,
    pub tenant: String,
    pub token: String,
    pub storage_url: String,
}

/// Small key/value store for auth tokens, injected wherever a token is read or written.
pub trait TokenCache: Send + Sync {
    fn read(&self, host: &str, tenant: &str) -> Result<Option<CachedToken>>;

    /// Replace (never merge) the entry for (host, tenant).
    fn write(&self, host: &str, tenant: &str, token: &str, storage_url: &str) -> Result<()>;
}

/// Expand a leading `~` using `$HOME`.
pub fn expand_path(path: &str) -> Result<PathBuf> {
    let home = || {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| StoreError::InvalidConfig("HOME environment variable not set".into()))
    };
    if let Some(stripped) = path.strip_prefix("~/") {
        Ok(home()?.join(stripped))
    } else if path == "~" {
        home()
    } else {
        Ok(PathBuf::from(path))
    }
}

/// Token cache backed by files in one directory (default `~/.swift`).
#[derive(Debug, Clone)]
pub struct FileTokenCache {
    dir: PathBuf,
}

impl FileTokenCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$SCISTORE_TOKEN_CACHE_DIR` if set, otherwise `~/.swift`.
    pub fn default_location() -> Result<Self> {
        let dir = match std::env::var(ENV_TOKEN_CACHE_DIR) {
            Ok(d) if !d.trim().is_empty() => expand_path(d.trim())?,
            _ => expand_path(DEFAULT_TOKEN_CACHE_DIR)?,
        };
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stem(host: &str, tenant: &str) -> String {
        format!("{}_v2_{}", host.replace('/', "_"), tenant.replace('/', "_"))
    }

    fn record_path(&self, host: &str, tenant: &str) -> PathBuf {
        self.dir.join(format!("auth_token_{}.json", Self::stem(host, tenant)))
    }

    fn legacy_paths(&self, host: &str, tenant: &str) -> (PathBuf, PathBuf) {
        let stem = Self::stem(host, tenant);
        (
            self.dir.join(format!("auth_token_{}", stem)),
            self.dir.join(format!("storageurl_{}", stem)),
        )
    }

    fn read_first_line(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(text.lines().next().map(|l| l.trim().to_string()).filter(|l| !l.is_empty())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_legacy(&self, host: &str, tenant: &str) -> Result<Option<CachedToken>> {
        let (token_path, url_path) = self.legacy_paths(host, tenant);
        let token = Self::read_first_line(&token_path)?;
        let storage_url = Self::read_first_line(&url_path)?;
        match (token, storage_url) {
            (Some(token), Some(storage_url)) => Ok(Some(CachedToken {
                host: host.to_string(),
                tenant: tenant.to_string(),
                token,
                storage_url,
            })),
            _ => Ok(None),
        }
    }
}

impl TokenCache for FileTokenCache {
    fn read(&self, host: &str, tenant: &str) -> Result<Option<CachedToken>> {
        let path = self.record_path(host, tenant);
        match fs::read(&path) {
            Ok(raw) => {
                let entry: CachedToken = serde_json::from_slice(&raw)?;
                debug!("token cache hit: {}", path.display());
                Ok(Some(entry))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.read_legacy(host, tenant),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, host: &str, tenant: &str, token: &str, storage_url: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let entry = CachedToken {
            host: host.to_string(),
            tenant: tenant.to_string(),
            token: token.to_string(),
            storage_url: storage_url.to_string(),
        };
        let path = self.record_path(host, tenant);

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&serde_json::to_vec(&entry)?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!("token cache updated: {}", path.display());
        Ok(())
    }
}

/// In-process cache, for tests and for callers that do not want files.
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    entries: Mutex<HashMap<(String, String), CachedToken>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl TokenCache for MemoryTokenCache {
    fn read(&self, host: &str, tenant: &str) -> Result<Option<CachedToken>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let entries = self.entries.lock().map_err(|_| anyhow::anyhow!("token cache lock poisoned"))?;
        Ok(entries.get(&(host.to_string(), tenant.to_string())).cloned())
    }

    fn write(&self, host: &str, tenant: &str, token: &str, storage_url: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().map_err(|_| anyhow::anyhow!("token cache lock poisoned"))?;
        entries.insert(
            (host.to_string(), tenant.to_string()),
            CachedToken {
                host: host.to_string(),
                tenant: tenant.to_string(),
                token: token.to_string(),
                storage_url: storage_url.to_string(),
            },
        );
        Ok(())
    }
}
