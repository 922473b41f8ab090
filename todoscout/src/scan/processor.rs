use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::File;
use std::path::Path;
use tracing::{trace, warn};

use super::parser::TodoParser;
use crate::config::EncodingMode;
use crate::errors::{ScanError, ScanResult};
use crate::metrics::ScanMetrics;
use crate::results::TodoItem;

/// Files at or above this size are memory mapped instead of read
pub(crate) const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// Decodes file bytes according to the encoding mode
fn decode_bytes<'a>(
    bytes: &'a [u8],
    path: &Path,
    encoding_mode: EncodingMode,
) -> ScanResult<Cow<'a, str>> {
    match encoding_mode {
        EncodingMode::FailFast => std::str::from_utf8(bytes)
            .map(Cow::Borrowed)
            .map_err(|e| ScanError::encoding_error(path, e)),
        EncodingMode::Lossy => {
            let cow = String::from_utf8_lossy(bytes);
            if let Cow::Owned(_) = cow {
                warn!("Invalid UTF-8 replaced in file: {}", path.display());
            }
            Ok(cow)
        }
    }
}

/// Reads one file and turns its marker lines into [`TodoItem`]s
#[derive(Debug)]
pub struct FileProcessor {
    parser: TodoParser,
    metrics: ScanMetrics,
    encoding_mode: EncodingMode,
}

impl FileProcessor {
    pub fn new(parser: TodoParser, metrics: ScanMetrics, encoding_mode: EncodingMode) -> Self {
        Self {
            parser,
            metrics,
            encoding_mode,
        }
    }

    /// Gets the metrics this processor reports into
    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    /// Parses already-decoded text. Line numbers start at 1. A leading
    /// byte-order mark is ignored.
    pub fn parse_contents(&self, relative_path: &str, contents: &str) -> Vec<TodoItem> {
        let contents = contents.strip_prefix('\u{FEFF}').unwrap_or(contents);
        contents
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                self.parser.parse_line(line).map(|parsed| TodoItem {
                    file_path: relative_path.to_string(),
                    line_number: index + 1,
                    content: parsed.content,
                    priority: parsed.priority,
                    assignee: parsed.assignee,
                    tags: parsed.tags,
                })
            })
            .collect()
    }

    fn process_small_file(
        &self,
        path: &Path,
        relative_path: &str,
    ) -> ScanResult<(u64, Vec<TodoItem>)> {
        let bytes = std::fs::read(path).map_err(|e| ScanError::from_io(path, e))?;
        let contents = decode_bytes(&bytes, path, self.encoding_mode)?;
        Ok((bytes.len() as u64, self.parse_contents(relative_path, &contents)))
    }

    fn process_mmap_file(
        &self,
        path: &Path,
        relative_path: &str,
    ) -> ScanResult<(u64, Vec<TodoItem>)> {
        let file = File::open(path).map_err(|e| ScanError::from_io(path, e))?;

        // SAFETY: the map is read-only and dropped before this function returns.
        // A concurrent truncation by another process is the usual mmap caveat.
        let mmap = unsafe { Mmap::map(&file) }.map_err(ScanError::IoError)?;

        let contents = decode_bytes(&mmap, path, self.encoding_mode)?;
        Ok((mmap.len() as u64, self.parse_contents(relative_path, &contents)))
    }

    /// Reads `path` fully and returns its items in line order
    pub fn process_file(&self, path: &Path, relative_path: &str) -> ScanResult<Vec<TodoItem>> {
        trace!("Processing file: {}", path.display());
        let _busy = self.metrics.enter_worker();

        let result = match path.metadata() {
            Ok(metadata) if metadata.len() >= LARGE_FILE_THRESHOLD => {
                self.process_mmap_file(path, relative_path)
            }
            Ok(_) => self.process_small_file(path, relative_path),
            Err(e) => Err(ScanError::from_io(path, e)),
        };

        match result {
            Ok((size, items)) => {
                self.metrics.record_file(size, items.len());
                Ok(items)
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e)
            }
        }
    }
}
