// src/transfer.rs
//
// Batch upload/download over a StoreHandle.
//
// Items run on a bounded worker pool (Semaphore + FuturesUnordered). Each item's
// outcome is recorded on its own; one failure never aborts its siblings, and the
// batch call only errors for problems that affect every item (handle not
// connected, missing target folder, bad config).

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use glob::glob;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::StoreHandle;
use crate::constants::{
    DEFAULT_SEGMENT_SIZE, DEFAULT_SEGMENT_THRESHOLD, ENV_JOBS, MAX_DEFAULT_JOBS, MIN_DEFAULT_JOBS,
    SEGMENT_CONTAINER_SUFFIX, UPLOADED_BY_KEY,
};
use crate::error::{Result, StoreError};
use crate::naming::{Metadata, encode_metadata, normalize_key, normalize_upload_name};
use crate::progress::ProgressCallback;

/// Name recorded in the `uploaded-by` metadata entry.
pub fn invoking_principal() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `$SCISTORE_JOBS`, else the CPU count clamped to 4..=32.
pub fn default_jobs() -> usize {
    std::env::var(ENV_JOBS)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(|| num_cpus::get().clamp(MIN_DEFAULT_JOBS, MAX_DEFAULT_JOBS))
}

/// Knobs for a batch transfer.
#[derive(Clone)]
pub struct TransferConfig {
    /// Maximum items in flight.
    pub jobs: usize,
    pub segment_size: u64,
    /// Files strictly larger than this are uploaded in segments.
    pub segment_threshold: u64,
    /// Randomize upload order.
    pub shuffle: bool,
    pub principal: String,
    /// Checked before each item starts; running items are never interrupted.
    pub cancel: Option<CancellationToken>,
    pub progress: Option<Arc<ProgressCallback>>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            segment_size: DEFAULT_SEGMENT_SIZE,
            segment_threshold: DEFAULT_SEGMENT_THRESHOLD,
            shuffle: true,
            principal: invoking_principal(),
            cancel: None,
            progress: None,
        }
    }
}

impl fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferConfig")
            .field("jobs", &self.jobs)
            .field("segment_size", &self.segment_size)
            .field("segment_threshold", &self.segment_threshold)
            .field("shuffle", &self.shuffle)
            .field("principal", &self.principal)
            .field("cancellable", &self.cancel.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl TransferConfig {
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    pub fn with_segment_threshold(mut self, threshold: u64) -> Self {
        self.segment_threshold = threshold;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = principal.into();
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_progress(mut self, progress: Arc<ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Pending,
    Success,
    Failed,
}

/// One local-path/object-key pair of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    pub local_path: PathBuf,
    pub object_key: String,
    pub outcome: TransferOutcome,
    pub error: Option<String>,
}

impl TransferItem {
    fn new(local_path: PathBuf, object_key: String) -> Self {
        Self { local_path, object_key, outcome: TransferOutcome::Pending, error: None }
    }

    fn fail(&mut self, error: impl Into<String>) {
        self.outcome = TransferOutcome::Failed;
        self.error = Some(error.into());
    }

    pub fn is_success(&self) -> bool {
        self.outcome == TransferOutcome::Success
    }
}

/// Snapshot of every item of a finished batch, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub items: Vec<TransferItem>,
}

impl TransferReport {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TransferItem> {
        self.items.iter().filter(|i| i.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TransferItem> {
        self.items.iter().filter(|i| i.outcome == TransferOutcome::Failed)
    }

    /// Local paths of successful items (for downloads, the files written).
    pub fn written_paths(&self) -> Vec<PathBuf> {
        self.succeeded().map(|i| i.local_path.clone()).collect()
    }

    /// Keys of successful items.
    pub fn object_keys(&self) -> Vec<String> {
        self.succeeded().map(|i| i.object_key.clone()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.items.iter().all(TransferItem::is_success)
    }
}

/// Expand glob patterns; plain paths pass through untouched.
pub fn expand_patterns<P: AsRef<Path>>(patterns: &[P]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pat in patterns {
        let s = pat.as_ref().to_string_lossy();
        if s.contains('*') || s.contains('?') || s.contains('[') {
            let entries = glob(&s).map_err(|e| StoreError::InvalidConfig(format!("bad pattern {s}: {e}")))?;
            for entry in entries {
                match entry {
                    Ok(pb) if pb.is_file() => paths.push(pb),
                    Ok(_) => {}
                    Err(e) => warn!("Glob error for pattern {}: {}", s, e),
                }
            }
        } else {
            paths.push(pat.as_ref().to_path_buf());
        }
    }
    Ok(paths)
}

/// Upload local files into the handle's bucket.
///
/// Keys come from [`normalize_upload_name`]; with exactly one path and an
/// `explicit_name`, that name (normalized against the prefix) is used instead.
pub async fn upload<P: AsRef<Path>>(
    handle: &StoreHandle,
    local_paths: &[P],
    explicit_name: Option<&str>,
    config: &TransferConfig,
) -> Result<TransferReport> {
    handle.session()?;
    if config.segment_size == 0 {
        return Err(StoreError::InvalidConfig("segment size must be greater than zero".into()));
    }

    let mut items: Vec<TransferItem> = local_paths
        .iter()
        .map(|p| {
            let path = p.as_ref().to_path_buf();
            let key = match explicit_name {
                Some(name) if local_paths.len() == 1 => normalize_key(name, handle.prefix()),
                _ => normalize_upload_name(&path.to_string_lossy(), handle.prefix()),
            };
            TransferItem::new(path, key)
        })
        .collect();
    if config.shuffle {
        items.shuffle(&mut rand::rng());
    }

    info!(
        "Starting upload of {} file(s) to {}/{} (jobs={})",
        items.len(),
        handle.bucket(),
        handle.prefix(),
        config.jobs.min(items.len().max(1))
    );

    let mut user_meta = Metadata::new();
    user_meta.insert(UPLOADED_BY_KEY.to_string(), config.principal.clone());
    let user_meta = Arc::new(user_meta);

    let report = run_batch(items, config, |item| {
        let handle = handle.clone();
        let meta = user_meta.clone();
        let (segment_size, threshold) = (config.segment_size, config.segment_threshold);
        async move {
            let bytes = upload_one(&handle, &item.local_path, &item.object_key, &meta, segment_size, threshold).await?;
            Ok((item.local_path, bytes))
        }
    })
    .await;

    info!("Finished upload: {} of {} file(s) succeeded", report.succeeded().count(), report.len());
    Ok(report)
}

/// Download objects into `target_folder` (or the current directory), naming each
/// file after the key's final path segment.
///
/// The target folder must already exist.
pub async fn download<S: AsRef<str>>(
    handle: &StoreHandle,
    object_keys: &[S],
    target_folder: Option<&Path>,
    config: &TransferConfig,
) -> Result<TransferReport> {
    handle.session()?;
    let base = match target_folder {
        Some(dir) if dir.is_dir() => dir.to_path_buf(),
        Some(dir) => return Err(StoreError::NotFound(format!("target folder {}", dir.display()))),
        None => std::env::current_dir()?,
    };

    let mut items: Vec<TransferItem> = object_keys
        .iter()
        .map(|k| {
            let key = handle.key_for(k.as_ref());
            let file_name = key.rsplit('/').next().unwrap_or_default();
            TransferItem::new(base.join(file_name), key)
        })
        .collect();

    // one writer per local file: later keys with the same final segment are not fetched
    let mut claimed: HashMap<PathBuf, String> = HashMap::new();
    for item in &mut items {
        if let Some(first) = claimed.get(&item.local_path) {
            let reason = format!("local file {} already targeted by {}", item.local_path.display(), first);
            warn!("skipping {}: {}", item.object_key, reason);
            item.fail(reason);
        } else {
            claimed.insert(item.local_path.clone(), item.object_key.clone());
        }
    }

    info!(
        "Starting download of {} object(s) from {} to {:?} (jobs={})",
        items.len(),
        handle.bucket(),
        base,
        config.jobs.min(items.len().max(1))
    );

    let report = run_batch(items, config, |item| {
        let handle = handle.clone();
        async move {
            if item.object_key.ends_with('/') {
                return Err(StoreError::InvalidConfig(format!("{} is not an object key", item.object_key)));
            }
            let data = handle.object_get(&item.object_key).await?;
            tokio::fs::write(&item.local_path, &data).await?;
            debug!("finished download of {} → {:?}", item.object_key, item.local_path);
            Ok((item.local_path, data.len() as u64))
        }
    })
    .await;

    info!("Finished download: {} of {} object(s) written", report.succeeded().count(), report.len());
    Ok(report)
}

async fn run_batch<F, Fut>(mut items: Vec<TransferItem>, config: &TransferConfig, op: F) -> TransferReport
where
    F: Fn(TransferItem) -> Fut,
    Fut: Future<Output = Result<(PathBuf, u64)>> + Send + 'static,
{
    let sem = Arc::new(Semaphore::new(config.jobs.clamp(1, items.len().max(1))));
    let mut futs = FuturesUnordered::new();

    for (idx, item) in items.iter().enumerate() {
        if item.outcome == TransferOutcome::Failed {
            if let Some(progress) = &config.progress {
                progress.object_completed(0);
            }
            continue;
        }
        let sem = sem.clone();
        let cancel = config.cancel.clone();
        let work = op(item.clone());
        let task = tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.map_err(|e| StoreError::Backend(e.into()))?;
            if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                return Err(StoreError::Cancelled);
            }
            work.await
        });
        futs.push(async move { (idx, task.await) });
    }

    while let Some((idx, joined)) = futs.next().await {
        let item = &mut items[idx];
        let bytes = match joined {
            Ok(Ok((path, bytes))) => {
                item.local_path = path;
                item.outcome = TransferOutcome::Success;
                bytes
            }
            Ok(Err(StoreError::Cancelled)) => {
                item.fail("cancelled");
                0
            }
            Ok(Err(e)) => {
                warn!("transfer of {} failed: {}", item.object_key, e);
                item.fail(e.to_string());
                0
            }
            Err(e) => {
                warn!("transfer task for {} aborted: {}", item.object_key, e);
                item.fail(format!("task aborted: {e}"));
                0
            }
        };
        if let Some(progress) = &config.progress {
            progress.object_completed(bytes);
        }
    }

    TransferReport { items }
}

async fn upload_one(
    handle: &StoreHandle,
    path: &Path,
    key: &str,
    meta: &Metadata,
    segment_size: u64,
    threshold: u64,
) -> Result<u64> {
    let fs_meta = tokio::fs::metadata(path).await?;
    if !fs_meta.is_file() {
        return Err(StoreError::NotFound(format!("{} is not a regular file", path.display())));
    }
    let size = fs_meta.len();

    if size <= threshold {
        let body = tokio::fs::read(path).await?;
        handle.put_typed(key, Bytes::from(body), None, Some(meta)).await?;
        debug!("finished upload of {:?} → {}/{}", path, handle.bucket(), key);
        return Ok(size);
    }

    let session = handle.session()?;
    let store = &handle.store;
    let segment_container = format!("{}{}", handle.bucket(), SEGMENT_CONTAINER_SUFFIX);
    let mtime = fs_meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    let segment_prefix = format!("{}/{:.6}/{}/{}/", key, mtime, size, segment_size);

    store.ensure_container(session, &segment_container).await?;

    let mut file = tokio::fs::File::open(path).await?;
    let mut remaining = size;
    let mut index: u64 = 0;
    while remaining > 0 {
        let len = remaining.min(segment_size) as usize;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;
        let segment_key = format!("{}{:08}", segment_prefix, index);
        store
            .put(session, &segment_container, &segment_key, Bytes::from(buf), None, &Metadata::new())
            .await?;
        remaining -= len as u64;
        index += 1;
    }

    store
        .put_manifest(session, handle.bucket(), key, &segment_container, &segment_prefix, &encode_metadata(meta))
        .await?;
    debug!("finished segmented upload of {:?} → {}/{} ({} segments)", path, handle.bucket(), key, index);
    Ok(size)
}
