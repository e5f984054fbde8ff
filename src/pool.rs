//! Bounded directory-backed file pool.
//!
//! [`FilePool`] presents a directory of same-extension files as a capped,
//! randomly-sampleable set. The in-memory index mirrors a snapshot of the
//! directory: rebuilt wholesale by [`FilePool::scan`], appended by
//! [`FilePool::add`], pruned by high-water-mark eviction. When an `add`
//! pushes the pool past `limit_max`, the oldest files (by modification
//! time) are deleted from disk until exactly `limit_min` remain.
//!
//! All mutation happens under one pool-wide lock; readers never observe a
//! half-built index.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use rand::Rng;
use tracing::{debug, warn};

use crate::telemetry;
use crate::{ArtgateError, Result};

/// A tracked file: full path plus last-modified timestamp.
#[derive(Debug, Clone)]
struct PooledFile {
    path: PathBuf,
    modified: SystemTime,
}

#[derive(Debug, Default)]
struct Index {
    files: Vec<PooledFile>,
    paths: HashSet<PathBuf>,
}

/// Capped pool of same-extension files in one directory.
#[derive(Debug)]
pub struct FilePool {
    dir: PathBuf,
    extension: String,
    limit_min: usize,
    limit_max: usize,
    inner: Mutex<Index>,
}

impl FilePool {
    /// Create a pool over `dir` tracking files with `extension` (no dot).
    ///
    /// `limit_min` is the size eviction restores the pool to; `limit_max`
    /// is the high-water mark that triggers it.
    pub fn new(
        dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        limit_min: usize,
        limit_max: usize,
    ) -> Result<Self> {
        if limit_min > limit_max {
            return Err(ArtgateError::Configuration(format!(
                "pool limit_min {limit_min} exceeds limit_max {limit_max}"
            )));
        }
        Ok(Self {
            dir: dir.into(),
            extension: extension.into(),
            limit_min,
            limit_max,
            inner: Mutex::new(Index::default()),
        })
    }

    /// The directory this pool mirrors.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the backing directory if missing and build the index.
    pub fn start(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        self.scan()
    }

    /// Rebuild the index from the directory contents.
    ///
    /// The replacement is atomic with respect to readers. If the directory
    /// cannot be read, the previous index is kept (stale-but-valid beats
    /// empty) and the error is returned.
    pub fn scan(&self) -> Result<()> {
        let entries = fs::read_dir(&self.dir)?;

        let mut files = Vec::new();
        let mut paths = HashSet::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !self.matches_extension(&path) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            paths.insert(path.clone());
            files.push(PooledFile { path, modified });
        }

        let mut inner = self.lock();
        inner.files = files;
        inner.paths = paths;
        debug!(dir = %self.dir.display(), count = inner.files.len(), "pool scan");
        Ok(())
    }

    /// Uniform random pick over the current index.
    ///
    /// `None` on an empty pool; callers must handle it.
    pub fn pick_random(&self) -> Option<PathBuf> {
        let inner = self.lock();
        if inner.files.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..inner.files.len());
        Some(inner.files[idx].path.clone())
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Track a newly written file.
    ///
    /// No-op when the extension does not match, the path is already
    /// indexed, or the file cannot be stat'd. Triggers eviction when the
    /// pool grows past `limit_max`.
    pub fn add(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if !self.matches_extension(path) {
            return;
        }

        let mut inner = self.lock();
        if inner.paths.contains(path) {
            return;
        }

        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skip untrackable file");
                return;
            }
        };
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        debug!(path = %path.display(), "pool add");
        inner.paths.insert(path.to_path_buf());
        inner.files.push(PooledFile {
            path: path.to_path_buf(),
            modified,
        });

        if inner.files.len() > self.limit_max {
            self.evict(&mut inner);
        }
    }

    /// Delete the oldest files until `limit_min` remain.
    ///
    /// Disk-removal failures are logged and skipped; the index entry is
    /// dropped either way, so a failed removal leaves an untracked file on
    /// disk rather than a tracked entry for a file scheduled for deletion.
    fn evict(&self, inner: &mut Index) {
        if inner.files.len() <= self.limit_max {
            return;
        }
        inner.files.sort_by_key(|f| f.modified);

        let excess = inner.files.len() - self.limit_min;
        for evicted in inner.files.drain(..excess) {
            inner.paths.remove(&evicted.path);
            if let Err(err) = fs::remove_file(&evicted.path) {
                warn!(path = %evicted.path.display(), error = %err, "evict failed");
                continue;
            }
            metrics::counter!(telemetry::POOL_EVICTIONS_TOTAL,
                "pool" => self.pool_label(),
            )
            .increment(1);
        }
        debug!(count = inner.files.len(), "pool evicted to limit_min");
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }

    fn pool_label(&self) -> String {
        self.dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("pool")
            .to_string()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Index> {
        // Index mutation never panics while the lock is held.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
