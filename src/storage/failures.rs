//! Failure log for URLs that could not be fetched
//!
//! Every URL that ends in a permanent failure is appended to a plain-text
//! file, one URL per line, so it can be replayed by hand later. Fetch workers
//! run concurrently, so writes are serialized behind a mutex and each line is
//! flushed before the lock is released.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Destination for permanently failed URLs
pub trait FailureSink: Send + Sync {
    /// Records one failed URL
    fn record(&self, url: &str) -> std::io::Result<()>;
}

/// Appends failed URLs to a file, flushing on every write
#[derive(Debug)]
pub struct FileFailureSink {
    path: PathBuf,
    lock: Mutex<()>,
    recorded: AtomicUsize,
}

impl FileFailureSink {
    /// Creates a sink appending to `path`
    ///
    /// The file is created on the first failure, not here; a run without
    /// failures leaves any previous log untouched.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            recorded: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of URLs recorded by this sink since it was created
    pub fn recorded_count(&self) -> usize {
        self.recorded.load(Ordering::Relaxed)
    }
}

impl FailureSink for FileFailureSink {
    fn record(&self, url: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", url)?;
        file.flush()?;

        self.recorded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Keeps failed URLs in memory
///
/// Useful when the caller wants to inspect failures instead of persisting them.
#[derive(Debug, Default)]
pub struct MemoryFailureSink {
    urls: Mutex<Vec<String>>,
}

impl MemoryFailureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded URLs in recording order
    pub fn urls(&self) -> Vec<String> {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FailureSink for MemoryFailureSink {
    fn record(&self, url: &str) -> std::io::Result<()> {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        Ok(())
    }
}
