//! `scistore` command line: list, get, put, metadata and batch transfers against
//! an object store configured from the environment (`OS_*` variables, `.env`, or
//! the `~/.swift` token cache).
//!
//! Examples:
//! ```bash
//! scistore ls       mybucket --prefix proj --filter owner=me
//! scistore get      mybucket proj/table.csv -o table.csv
//! scistore put      mybucket proj/notes.json ./notes.json --meta tag=draft
//! scistore meta-get mybucket proj/notes.json
//! scistore meta-set mybucket proj/notes.json tag=final
//! scistore upload   mybucket 'data/*.csv' --prefix proj -j 8
//! scistore download mybucket a.csv b.csv --prefix proj -d ./out
//! ```

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scistore::naming::parse_metadata_pairs;
use scistore::progress::{ProgressCallback, TransferProgressTracker};
use scistore::{BackendKind, Metadata, StoreHandle, TransferConfig, TransferReport, expand_patterns};

/// Print to stdout, exiting quietly on a broken pipe (e.g. piped into `head`).
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => std::process::exit(0),
            Err(e) => return Err(e.into()),
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(
        short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// Storage provider (swift, s3, google, azure)
    #[arg(short = 'b', long, global = true, default_value = "swift")]
    backend: BackendKind,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List objects under a prefix, optionally keeping only those whose metadata matches.
    Ls {
        bucket: String,
        #[arg(short, long, default_value = "")]
        prefix: String,
        /// key=value pair the object's metadata must contain (repeatable)
        #[arg(short, long = "filter", value_name = "KEY=VALUE")]
        filter: Vec<String>,
    },
    /// Fetch one object to a file or stdout.
    Get {
        bucket: String,
        key: String,
        #[arg(short, long, default_value = "")]
        prefix: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Store one local file under a key.
    Put {
        bucket: String,
        key: String,
        file: PathBuf,
        #[arg(short, long, default_value = "")]
        prefix: String,
        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },
    /// Print an object's user metadata.
    MetaGet {
        bucket: String,
        key: String,
        #[arg(short, long, default_value = "")]
        prefix: String,
    },
    /// Replace an object's user metadata.
    MetaSet {
        bucket: String,
        key: String,
        #[arg(required = true, value_name = "KEY=VALUE")]
        pairs: Vec<String>,
        #[arg(short, long, default_value = "")]
        prefix: String,
    },
    /// Upload local files (globs allowed) concurrently.
    Upload {
        bucket: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long, default_value = "")]
        prefix: String,
        /// Object name, only valid with a single file
        #[arg(short, long)]
        name: Option<String>,
        /// Maximum parallel uploads (default: $SCISTORE_JOBS or CPU count)
        #[arg(short = 'j', long = "jobs")]
        jobs: Option<usize>,
        /// Segment size in MiB for large files
        #[arg(long = "segment-mib")]
        segment_mib: Option<u64>,
        #[arg(long)]
        no_progress: bool,
    },
    /// Download objects into an existing directory.
    Download {
        bucket: String,
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(short, long, default_value = "")]
        prefix: String,
        #[arg(short = 'd', long = "dir")]
        dir: Option<PathBuf>,
        #[arg(short = 'j', long = "jobs")]
        jobs: Option<usize>,
        #[arg(long)]
        no_progress: bool,
    },
}

fn parse_pairs(pairs: &[String]) -> Result<Metadata> {
    parse_metadata_pairs(pairs).with_context(|| format!("expected KEY=VALUE pairs, got {:?}", pairs))
}

async fn connect(backend: BackendKind, bucket: &str, prefix: &str) -> Result<StoreHandle> {
    StoreHandle::from_env(backend, bucket, prefix)
        .await
        .with_context(|| format!("connecting to {} bucket '{}'", backend, bucket))
}

fn transfer_config(jobs: Option<usize>, show_progress: bool, operation: &str, count: u64, bytes: u64) -> TransferConfig {
    let mut cfg = TransferConfig::default();
    if let Some(j) = jobs {
        cfg = cfg.with_jobs(j);
    }
    if show_progress {
        let tracker = Arc::new(TransferProgressTracker::new(operation, count, bytes));
        cfg = cfg.with_progress(Arc::new(ProgressCallback::new(tracker, count)));
    }
    cfg
}

/// Print failed items and turn a partial batch into a non-zero exit.
fn finish_batch(operation: &str, report: &TransferReport, cfg: &TransferConfig, started: Instant) -> Result<()> {
    if let Some(progress) = &cfg.progress {
        progress.tracker.finish(operation, progress.bytes(), started.elapsed());
    }
    for item in report.failed() {
        eprintln!(
            "FAILED {} ({}): {}",
            item.object_key,
            item.local_path.display(),
            item.error.as_deref().unwrap_or("unknown error")
        );
    }
    let failed = report.failed().count();
    if failed > 0 {
        bail!("{} of {} item(s) failed", failed, report.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
    tracing_log::LogTracer::init().ok();

    let backend = cli.backend;
    match cli.cmd {
        Command::Ls { bucket, prefix, filter } => {
            let handle = connect(backend, &bucket, &prefix).await?;
            let filter = if filter.is_empty() { None } else { Some(parse_pairs(&filter)?) };
            let names = handle.bucket_list(filter.as_ref()).await?;
            for name in &names {
                safe_println!("{}", name);
            }
            info!("{} object(s)", names.len());
        }

        Command::Get { bucket, key, prefix, output } => {
            let handle = connect(backend, &bucket, &prefix).await?;
            let data = handle.object_get(&key).await.with_context(|| format!("get {}", key))?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &data).await.with_context(|| format!("writing {}", path.display()))?;
                    info!("wrote {} bytes to {}", data.len(), path.display());
                }
                None => {
                    let mut out = io::stdout().lock();
                    match out.write_all(&data) {
                        Err(e) if e.kind() == ErrorKind::BrokenPipe => return Ok(()),
                        other => other?,
                    }
                }
            }
        }

        Command::Put { bucket, key, file, prefix, meta } => {
            let handle = connect(backend, &bucket, &prefix).await?;
            let meta = if meta.is_empty() { None } else { Some(parse_pairs(&meta)?) };
            let body = tokio::fs::read(&file).await.with_context(|| format!("reading {}", file.display()))?;
            handle.object_put(&key, body, meta.as_ref()).await?;
            safe_println!("{}", handle.key_for(&key));
        }

        Command::MetaGet { bucket, key, prefix } => {
            let handle = connect(backend, &bucket, &prefix).await?;
            let meta = handle.object_meta_get(&key).await?;
            let mut pairs: Vec<_> = meta.into_iter().collect();
            pairs.sort();
            for (k, v) in pairs {
                safe_println!("{}={}", k, v);
            }
        }

        Command::MetaSet { bucket, key, pairs, prefix } => {
            let handle = connect(backend, &bucket, &prefix).await?;
            handle.object_meta_set(&key, &parse_pairs(&pairs)?).await?;
        }

        Command::Upload { bucket, files, prefix, name, jobs, segment_mib, no_progress } => {
            let paths = expand_patterns(&files)?;
            if paths.is_empty() {
                bail!("No files found to upload");
            }
            if name.is_some() && paths.len() != 1 {
                bail!("--name needs exactly one file, {} matched", paths.len());
            }
            let total_bytes: u64 = paths.iter().filter_map(|p| std::fs::metadata(p).ok()).map(|m| m.len()).sum();

            let handle = connect(backend, &bucket, &prefix).await?;
            let mut cfg = transfer_config(jobs, !no_progress, "UPLOAD", paths.len() as u64, total_bytes);
            if let Some(mib) = segment_mib {
                cfg = cfg.with_segment_size(mib * 1024 * 1024);
            }

            let started = Instant::now();
            let report = scistore::upload(&handle, &paths, name.as_deref(), &cfg).await?;
            finish_batch("UPLOAD", &report, &cfg, started)?;
        }

        Command::Download { bucket, keys, prefix, dir, jobs, no_progress } => {
            let handle = connect(backend, &bucket, &prefix).await?;
            let cfg = transfer_config(jobs, !no_progress, "DOWNLOAD", keys.len() as u64, 0);

            let started = Instant::now();
            let report = scistore::download(&handle, &keys, dir.as_deref(), &cfg).await?;
            if let Some(progress) = &cfg.progress {
                progress.tracker.set_total_bytes(progress.bytes());
            }
            for path in report.written_paths() {
                safe_println!("{}", path.display());
            }
            finish_batch("DOWNLOAD", &report, &cfg, started)?;
        }
    }

    Ok(())
}
