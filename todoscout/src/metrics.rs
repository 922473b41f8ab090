use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::scan::processor::LARGE_FILE_THRESHOLD;

/// Counters shared by every worker of a scan. Cloning shares the counters.
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    // Worker occupancy
    active_workers: Arc<AtomicU64>,
    peak_workers: Arc<AtomicU64>,

    // File processing
    files_read: Arc<AtomicU64>,
    files_failed: Arc<AtomicU64>,
    bytes_read: Arc<AtomicU64>,
    mmap_files: Arc<AtomicU64>,
    todos_found: Arc<AtomicU64>,
}

/// Marks one worker as busy until dropped
#[derive(Debug)]
pub struct WorkerGuard {
    active: Arc<AtomicU64>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScanMetrics {
    /// Creates a new ScanMetrics instance
    pub fn new() -> Self {
        Self {
            active_workers: Arc::new(AtomicU64::new(0)),
            peak_workers: Arc::new(AtomicU64::new(0)),
            files_read: Arc::new(AtomicU64::new(0)),
            files_failed: Arc::new(AtomicU64::new(0)),
            bytes_read: Arc::new(AtomicU64::new(0)),
            mmap_files: Arc::new(AtomicU64::new(0)),
            todos_found: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a busy worker and raises the peak if needed
    pub fn enter_worker(&self) -> WorkerGuard {
        let active = self.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        let mut peak = self.peak_workers.load(Ordering::SeqCst);
        while active > peak {
            match self.peak_workers.compare_exchange_weak(
                peak,
                active,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(current) => peak = current,
            }
        }
        WorkerGuard {
            active: Arc::clone(&self.active_workers),
        }
    }

    /// Records a successfully read file
    pub fn record_file(&self, size: u64, todos: usize) {
        self.files_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(size, Ordering::Relaxed);
        self.todos_found.fetch_add(todos as u64, Ordering::Relaxed);
        if size >= LARGE_FILE_THRESHOLD {
            self.mmap_files.fetch_add(1, Ordering::Relaxed);
        }
        debug!("File read: {} bytes, {} todos", size, todos);
    }

    /// Records a file that could not be read
    pub fn record_failure(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets a snapshot of the counters
    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            active_workers: self.active_workers.load(Ordering::SeqCst),
            peak_workers: self.peak_workers.load(Ordering::SeqCst),
            files_read: self.files_read.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            mmap_files: self.mmap_files.load(Ordering::Relaxed),
            todos_found: self.todos_found.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Scan stats:\n\
             Files read/failed: {}/{}\n\
             Bytes read: {}\n\
             Memory mapped files: {}\n\
             TODOs found: {}\n\
             Peak concurrent workers: {}",
            stats.files_read,
            stats.files_failed,
            stats.bytes_read,
            stats.mmap_files,
            stats.todos_found,
            stats.peak_workers
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`ScanMetrics`]
#[derive(Debug, Clone, Copy)]
pub struct ScanStats {
    pub active_workers: u64,
    pub peak_workers: u64,
    pub files_read: u64,
    pub files_failed: u64,
    pub bytes_read: u64,
    pub mmap_files: u64,
    pub todos_found: u64,
}
