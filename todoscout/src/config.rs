use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ScanError, ScanResult};

/// Configuration for a scan.
///
/// # Configuration Locations
///
/// Values are layered from, in increasing order of precedence:
/// 1. Global `$CONFIG_DIR/todoscout/config.yaml`
/// 2. Local `.todoscout.yaml` in the current directory
/// 3. Custom config file specified via `--config`
///
/// Command-line flags are applied last through [`ScanConfig::merge_with_cli`].
///
/// # Configuration Format
///
/// ```yaml
/// root_path: "."
///
/// # Extensions may be written "rs", ".rs" or "*.rs"
/// include_extensions: ["rs", "ts", "py"]
///
/// # Directory names skipped wherever they appear
/// exclude_folders: ["target", "node_modules"]
///
/// # Root-relative glob patterns for directories to skip
/// exclude_patterns: ["**/generated/**"]
///
/// keywords: ["TODO", "FIXME", "HACK"]
/// concurrency_limit: 8
/// encoding_mode: lossy
/// log_level: "info"
///
/// delivery:
///   slack_webhook_url: "https://hooks.slack.com/services/..."
///   notion_api_key: "secret_..."
///   notion_database_id: "0f1e2d3c..."
///   concurrency: 3
///   max_attempts: 3
///   base_delay_ms: 500
/// ```
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory to scan. `None` means no workspace is configured and a scan
    /// fails with `RootUnavailable`.
    #[serde(default)]
    pub root_path: Option<PathBuf>,

    /// File extensions to scan, compared case-insensitively
    #[serde(default = "default_include_extensions")]
    pub include_extensions: Vec<String>,

    /// Bare directory names that are never descended into
    #[serde(default = "default_exclude_folders")]
    pub exclude_folders: Vec<String>,

    /// Glob patterns matched against root-relative directory paths
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Marker words, matched case-insensitively. An entry may hold several
    /// comma-separated words.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Maximum number of files read and parsed at the same time
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: NonZeroUsize,

    /// How to handle invalid UTF-8 in scanned files
    #[serde(default)]
    pub encoding_mode: EncodingMode,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// How file contents that are not valid UTF-8 are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Replace invalid sequences with U+FFFD and keep scanning the file
    #[default]
    Lossy,
    /// Treat the file as unreadable
    FailFast,
}

impl std::str::FromStr for EncodingMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lossy" => Ok(Self::Lossy),
            "failfast" | "fail-fast" => Ok(Self::FailFast),
            other => Err(ScanError::config_error(format!(
                "unknown encoding mode '{}' (expected lossy or failfast)",
                other
            ))),
        }
    }
}

/// Settings for sending TODOs to an external service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Slack incoming-webhook URL
    #[serde(default)]
    pub slack_webhook_url: Option<String>,

    /// Notion integration token
    #[serde(default)]
    pub notion_api_key: Option<String>,

    /// Notion database that receives one page per TODO
    #[serde(default)]
    pub notion_database_id: Option<String>,

    /// Maximum number of items in flight at once
    #[serde(default = "default_delivery_concurrency")]
    pub concurrency: NonZeroUsize,

    /// Attempts per item, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff base; attempt `n` waits `base * 2^n` before retrying
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl DeliveryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            slack_webhook_url: None,
            notion_api_key: None,
            notion_database_id: None,
            concurrency: default_delivery_concurrency(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Values supplied on the command line. `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_path: Option<PathBuf>,
    pub include_extensions: Option<Vec<String>>,
    pub exclude_folders: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub keywords: Option<Vec<String>>,
    pub concurrency_limit: Option<NonZeroUsize>,
    pub encoding_mode: Option<EncodingMode>,
    pub log_level: Option<String>,
    pub slack_webhook_url: Option<String>,
    pub notion_api_key: Option<String>,
    pub notion_database_id: Option<String>,
}

const DEFAULT_EXCLUDED_FOLDERS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "out",
    ".vscode",
    "coverage",
    ".nyc_output",
    "logs",
    "tmp",
    "temp",
];

fn default_include_extensions() -> Vec<String> {
    [
        "js", "ts", "jsx", "tsx", "py", "java", "cpp", "c", "cs", "php", "rb", "go", "rs",
        "swift", "kt", "scala", "vue", "svelte",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude_folders() -> Vec<String> {
    DEFAULT_EXCLUDED_FOLDERS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_patterns() -> Vec<String> {
    DEFAULT_EXCLUDED_FOLDERS
        .iter()
        .map(|name| format!("**/{}/**", name))
        .collect()
}

fn default_keywords() -> Vec<String> {
    ["TODO", "FIXME", "HACK", "NOTE", "BUG"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_concurrency_limit() -> NonZeroUsize {
    NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN)
}

fn default_delivery_concurrency() -> NonZeroUsize {
    NonZeroUsize::new(3).unwrap_or(NonZeroUsize::MIN)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root_path: None,
            include_extensions: default_include_extensions(),
            exclude_folders: default_exclude_folders(),
            exclude_patterns: default_exclude_patterns(),
            keywords: default_keywords(),
            concurrency_limit: default_concurrency_limit(),
            encoding_mode: EncodingMode::default(),
            log_level: default_log_level(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl ScanConfig {
    /// A default configuration rooted at `root`
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root_path: Some(root.into()),
            ..Self::default()
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> ScanResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration, layering `config_path` over the default locations.
    /// An explicit path that does not exist is an error.
    pub fn load_from(config_path: Option<&Path>) -> ScanResult<Self> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ScanError::config_error(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("todoscout/config.yaml")),
            Some(PathBuf::from(".todoscout.yaml")),
            config_path.map(PathBuf::from),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Applies command-line values on top of file values
    pub fn merge_with_cli(mut self, cli: CliOverrides) -> Self {
        if let Some(root) = cli.root_path {
            self.root_path = Some(root);
        }
        if let Some(exts) = cli.include_extensions {
            self.include_extensions = exts;
        }
        // Exclusions from the command line add to the configured ones
        self.exclude_folders.extend(cli.exclude_folders);
        self.exclude_patterns.extend(cli.exclude_patterns);
        if let Some(keywords) = cli.keywords {
            self.keywords = keywords;
        }
        if let Some(limit) = cli.concurrency_limit {
            self.concurrency_limit = limit;
        }
        if let Some(mode) = cli.encoding_mode {
            self.encoding_mode = mode;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        if let Some(url) = cli.slack_webhook_url {
            self.delivery.slack_webhook_url = Some(url);
        }
        if let Some(key) = cli.notion_api_key {
            self.delivery.notion_api_key = Some(key);
        }
        if let Some(id) = cli.notion_database_id {
            self.delivery.notion_database_id = Some(id);
        }
        self
    }

    /// Keywords split on commas, trimmed, with blanks dropped
    pub fn active_keywords(&self) -> Vec<String> {
        self.keywords
            .iter()
            .flat_map(|k| k.split(','))
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let config_content = r#"
            root_path: "src"
            include_extensions: ["rs", "toml"]
            exclude_folders: ["target"]
            exclude_patterns: ["**/generated/**"]
            keywords: ["TODO", "XXX"]
            concurrency_limit: 4
            encoding_mode: failfast
            log_level: "debug"
            delivery:
              slack_webhook_url: "https://hooks.example.com/abc"
              notion_database_id: "0f1e2d3c"
              max_attempts: 5
        "#;

        let mut file = File::create(&config_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let config = ScanConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.root_path, Some(PathBuf::from("src")));
        assert_eq!(config.include_extensions, vec!["rs", "toml"]);
        assert_eq!(config.exclude_folders, vec!["target"]);
        assert_eq!(config.exclude_patterns, vec!["**/generated/**"]);
        assert_eq!(config.keywords, vec!["TODO", "XXX"]);
        assert_eq!(config.concurrency_limit, NonZeroUsize::new(4).unwrap());
        assert_eq!(config.encoding_mode, EncodingMode::FailFast);
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.delivery.slack_webhook_url.as_deref(),
            Some("https://hooks.example.com/abc")
        );
        assert_eq!(config.delivery.notion_database_id.as_deref(), Some("0f1e2d3c"));
        assert_eq!(config.delivery.notion_api_key, None);
        assert_eq!(config.delivery.max_attempts, 5);
        assert_eq!(config.delivery.base_delay_ms, 500);
    }

    #[test]
    fn test_default_values() {
        let config = ScanConfig::default();
        assert!(config.root_path.is_none());
        assert!(config.include_extensions.contains(&"ts".to_string()));
        assert!(config.exclude_folders.contains(&"node_modules".to_string()));
        assert!(config
            .exclude_patterns
            .contains(&"**/node_modules/**".to_string()));
        assert_eq!(config.keywords, vec!["TODO", "FIXME", "HACK", "NOTE", "BUG"]);
        assert_eq!(config.concurrency_limit.get(), 10);
        assert_eq!(config.encoding_mode, EncodingMode::Lossy);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.delivery.concurrency.get(), 3);
        assert_eq!(config.delivery.max_attempts, 3);
    }

    #[test]
    fn test_merge_with_cli() {
        let file_config = ScanConfig {
            root_path: Some(PathBuf::from("src")),
            include_extensions: vec!["rs".to_string()],
            exclude_folders: vec!["target".to_string()],
            exclude_patterns: vec![],
            keywords: vec!["TODO".to_string()],
            concurrency_limit: NonZeroUsize::new(4).unwrap(),
            encoding_mode: EncodingMode::Lossy,
            log_level: "warn".to_string(),
            delivery: DeliveryConfig::default(),
        };

        let cli = CliOverrides {
            root_path: Some(PathBuf::from("tests")),
            include_extensions: None,
            exclude_folders: vec!["vendor".to_string()],
            exclude_patterns: vec!["**/fixtures/**".to_string()],
            keywords: Some(vec!["FIXME".to_string()]),
            concurrency_limit: NonZeroUsize::new(8),
            encoding_mode: None,
            log_level: Some("debug".to_string()),
            slack_webhook_url: Some("https://hooks.example.com/x".to_string()),
            notion_api_key: Some("secret_abc".to_string()),
            notion_database_id: None,
        };

        let merged = file_config.merge_with_cli(cli);
        assert_eq!(merged.root_path, Some(PathBuf::from("tests")));
        assert_eq!(merged.include_extensions, vec!["rs"]); // file value kept
        assert_eq!(merged.exclude_folders, vec!["target", "vendor"]);
        assert_eq!(merged.exclude_patterns, vec!["**/fixtures/**"]);
        assert_eq!(merged.keywords, vec!["FIXME"]);
        assert_eq!(merged.concurrency_limit.get(), 8);
        assert_eq!(merged.encoding_mode, EncodingMode::Lossy);
        assert_eq!(merged.log_level, "debug");
        assert!(merged.delivery.slack_webhook_url.is_some());
        assert_eq!(merged.delivery.notion_api_key.as_deref(), Some("secret_abc"));
        assert_eq!(merged.delivery.notion_database_id, None);
    }

    #[test]
    fn test_active_keywords_splits_and_trims() {
        let config = ScanConfig {
            keywords: vec!["TODO, FIXME".to_string(), " ".to_string(), "HACK".to_string()],
            ..ScanConfig::default()
        };
        assert_eq!(config.active_keywords(), vec!["TODO", "FIXME", "HACK"]);
    }

    #[test]
    fn test_encoding_mode_from_str() {
        assert_eq!("lossy".parse::<EncodingMode>().unwrap(), EncodingMode::Lossy);
        assert_eq!(
            "FailFast".parse::<EncodingMode>().unwrap(),
            EncodingMode::FailFast
        );
        assert!("utf-16".parse::<EncodingMode>().is_err());
    }

    #[test]
    fn test_invalid_config() {
        let config_content = r#"
            concurrency_limit: "invalid"
            keywords: 12
        "#;

        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let result = ScanConfig::load_from(Some(&config_path));
        assert!(result.is_err(), "Expected error loading invalid config");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ScanConfig::load_from(Some(Path::new("nonexistent.yaml")));
        assert!(matches!(result, Err(ScanError::ConfigError(_))));
    }
}
