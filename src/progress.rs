// src/progress.rs
//
// Progress display for batch transfers.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Byte-based bar for one batch, with an "n/m objects" message.
pub struct TransferProgressTracker {
    bar: ProgressBar,
}

impl TransferProgressTracker {
    pub fn new(operation: &str, total_objects: u64, total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);
        let template = format!("{operation} [{{elapsed_precise}}] {{wide_bar}} {{bytes}}/{{total_bytes}} {{msg}}");
        bar.set_style(
            ProgressStyle::default_bar()
                .template(&template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(format!("0/{total_objects} objects"));
        Self { bar }
    }

    /// Draws nothing; for non-interactive runs.
    pub fn hidden(total_bytes: u64) -> Self {
        Self { bar: ProgressBar::with_draw_target(Some(total_bytes), ProgressDrawTarget::hidden()) }
    }

    fn update(&self, bytes_transferred: u64, objects_completed: u64, total_objects: u64) {
        self.bar.set_position(bytes_transferred);
        self.bar.set_message(format!("{objects_completed}/{total_objects} objects"));
    }

    /// Bytes shown so far.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Downloads learn their size only as objects arrive.
    pub fn set_total_bytes(&self, total_bytes: u64) {
        self.bar.set_length(total_bytes);
    }

    pub fn finish(&self, operation: &str, total_bytes: u64, duration: Duration) {
        let mib = total_bytes as f64 / 1_048_576.0;
        let secs = duration.as_secs_f64();
        self.bar.finish_with_message(format!(
            "{operation}: {mib:.2} MiB in {secs:.2}s ({:.2} MiB/s)",
            mib / secs.max(f64::EPSILON)
        ));
    }
}

/// Shared counter the orchestrator bumps once per finished item.
pub struct ProgressCallback {
    pub tracker: Arc<TransferProgressTracker>,
    pub objects_completed: AtomicU64,
    pub bytes_transferred: AtomicU64,
    pub total_objects: u64,
}

impl ProgressCallback {
    pub fn new(tracker: Arc<TransferProgressTracker>, total_objects: u64) -> Self {
        Self {
            tracker,
            objects_completed: AtomicU64::new(0),
            bytes_transferred: AtomicU64::new(0),
            total_objects,
        }
    }

    /// Called when one item finishes, successfully or not; failures pass 0 bytes.
    pub fn object_completed(&self, bytes: u64) {
        let completed = self.objects_completed.fetch_add(1, Ordering::Relaxed) + 1;
        let total_bytes = self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.tracker.update(total_bytes, completed, self.total_objects);
    }

    pub fn completed(&self) -> u64 {
        self.objects_completed.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }
}
