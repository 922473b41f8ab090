use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::parser::TodoParser;
use super::processor::FileProcessor;
use crate::config::ScanConfig;
use crate::errors::{ScanError, ScanResult};
use crate::metrics::ScanMetrics;
use crate::results::{ScanOutput, TodoItem};
use crate::walker::{relative_path, DirectoryWalker};

/// Scans a tree once with a throwaway [`TodoScanner`]
pub fn scan(config: &ScanConfig) -> ScanResult<ScanOutput> {
    TodoScanner::new(config.clone())?.scan()
}

/// A reusable scanner. Keyword and exclude patterns are compiled and the
/// worker pool is started once, in [`TodoScanner::new`].
#[derive(Debug)]
pub struct TodoScanner {
    config: ScanConfig,
    walker: DirectoryWalker,
    processor: FileProcessor,
    pool: ThreadPool,
}

impl TodoScanner {
    pub fn new(config: ScanConfig) -> ScanResult<Self> {
        let keywords = config.active_keywords();
        if keywords.is_empty() {
            warn!("No keywords configured; scans will find nothing");
        }

        let parser = TodoParser::new(&keywords)?;
        let processor = FileProcessor::new(parser, ScanMetrics::new(), config.encoding_mode);
        let walker = DirectoryWalker::new(PathBuf::new(), &config);

        let limit = config.concurrency_limit.get();
        let pool = ThreadPoolBuilder::new()
            .num_threads(limit)
            .thread_name(|i| format!("todoscout-worker-{}", i))
            .build()
            .map_err(|e| {
                ScanError::config_error(format!("failed to start {} scan workers: {}", limit, e))
            })?;
        debug!("Started scan pool with {} workers", limit);

        Ok(Self {
            config,
            walker,
            processor,
            pool,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Counters accumulated over every scan run by this scanner
    pub fn metrics(&self) -> &ScanMetrics {
        self.processor.metrics()
    }

    /// Resolves the configured root to an existing directory
    pub fn resolve_root(&self) -> ScanResult<PathBuf> {
        let root = self
            .config
            .root_path
            .as_deref()
            .ok_or_else(|| ScanError::root_unavailable("no scan root is configured"))?;

        let canonical = root.canonicalize().map_err(|e| {
            ScanError::root_unavailable(format!("{}: {}", root.display(), e))
        })?;
        if !canonical.is_dir() {
            return Err(ScanError::root_unavailable(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(strip_unc_prefix(&canonical))
    }

    /// Walks the configured root and extracts every marker.
    ///
    /// Returns only after all file workers have finished. Unreadable
    /// directories and files are skipped with a warning.
    pub fn scan(&self) -> ScanResult<ScanOutput> {
        let root = self.resolve_root()?;
        info!("Scanning {} for TODO markers", root.display());

        let files = self.walker.with_root(&root).walk();
        debug!(
            "Dispatching {} files to {} workers",
            files.len(),
            self.pool.current_num_threads()
        );

        let per_file: Vec<Option<Vec<TodoItem>>> = self.pool.install(|| {
            files
                .par_iter()
                .map(|path| self.scan_file(&root, path))
                .collect()
        });

        let mut output = ScanOutput::new();
        for items in per_file {
            match items {
                Some(items) => output.add_file_items(items),
                None => output.add_failed_file(),
            }
        }

        self.metrics().log_stats();
        info!(
            "Scan complete. Found {} TODOs in {} of {} files ({} unreadable)",
            output.total_todos(),
            output.files_with_todos,
            output.files_scanned,
            output.files_failed
        );

        Ok(output)
    }

    fn scan_file(&self, root: &Path, path: &Path) -> Option<Vec<TodoItem>> {
        let relative = relative_path(root, path);
        match self.processor.process_file(path, &relative) {
            Ok(items) => Some(items),
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", relative, e);
                None
            }
        }
    }
}

/// Strips the Windows UNC prefix (\\?\) left by canonicalize
fn strip_unc_prefix(p: &Path) -> PathBuf {
    let s = p.display().to_string();
    match s.strip_prefix(r"\\?\") {
        Some(stripped) => PathBuf::from(stripped),
        None => p.to_path_buf(),
    }
}
