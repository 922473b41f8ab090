//! Error types for todoscout.
//!
//! Only a handful of failures ever reach the caller of a scan. A missing
//! root aborts the whole operation; unreadable directories and files are
//! logged and dropped by the walker and scanner, which still use these
//! variants internally so the log line says what went wrong.
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that can occur while scanning a tree for TODO markers
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Scan root unavailable: {0}")]
    RootUnavailable(String),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Failed to read directory {path}: {message}")]
    DirectoryRead { path: PathBuf, message: String },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Export failed: {0}")]
    ExportError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid UTF-8 in file {path}: {source}")]
    EncodingError {
        path: PathBuf,
        source: std::str::Utf8Error,
    },
}

impl ScanError {
    pub fn root_unavailable(reason: impl Into<String>) -> Self {
        Self::RootUnavailable(reason.into())
    }

    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn invalid_pattern(pattern: impl Into<String>) -> Self {
        Self::InvalidPattern(pattern.into())
    }

    pub fn directory_read(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DirectoryRead {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn export_error(msg: impl Into<String>) -> Self {
        Self::ExportError(msg.into())
    }

    pub fn encoding_error(path: impl Into<PathBuf>, source: std::str::Utf8Error) -> Self {
        Self::EncodingError {
            path: path.into(),
            source,
        }
    }

    /// Maps an I/O error on `path` to the most specific variant
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::file_not_found(path),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }
}

impl From<config::ConfigError> for ScanError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}
