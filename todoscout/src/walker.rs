//! Candidate file discovery.
//!
//! The walker lists directories only; it never opens a file. Directories are
//! pruned by bare name or by root-relative glob, files are kept by
//! extension. Hidden files and `.gitignore` rules get no special treatment,
//! only the configured exclusions apply. Symbolic links are neither followed
//! nor reported.
use ignore::{DirEntry, WalkBuilder};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::config::ScanConfig;
use crate::errors::ScanError;
use crate::glob::GlobSet;

/// Recursively enumerates the files a scan should read
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    root: PathBuf,
    exclude_folders: HashSet<String>,
    exclude_patterns: GlobSet,
    extensions: HashSet<String>,
}

impl DirectoryWalker {
    /// Builds a walker for `root`, compiling the exclude patterns once
    pub fn new(root: impl Into<PathBuf>, config: &ScanConfig) -> Self {
        Self {
            root: root.into(),
            exclude_folders: config.exclude_folders.iter().cloned().collect(),
            exclude_patterns: GlobSet::new(&config.exclude_patterns),
            extensions: config
                .include_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// The same filters applied to a different root
    pub fn with_root(&self, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..self.clone()
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when a directory and everything under it must be skipped
    pub fn should_skip_dir(&self, name: &str, relative_path: &str) -> bool {
        self.exclude_folders.contains(name) || self.exclude_patterns.is_match(relative_path)
    }

    /// True when the file's extension is one of the included ones
    pub fn has_included_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    fn keep_entry(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
        if !is_dir {
            return true;
        }

        let name = entry.file_name().to_string_lossy();
        let relative = relative_path(&self.root, entry.path());
        let skip = self.should_skip_dir(&name, &relative);
        if skip {
            debug!("Skipping excluded directory: {}", relative);
        }
        !skip
    }

    /// Lists every included file under the root. Unreadable directories are
    /// logged and treated as empty.
    pub fn walk(&self) -> Vec<PathBuf> {
        let filter = self.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| filter.keep_entry(entry));

        let mut files = Vec::new();
        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
                    if is_file && self.has_included_extension(entry.path()) {
                        trace!("Candidate file: {}", entry.path().display());
                        files.push(entry.into_path());
                    }
                }
                Err(err) => warn!("{}; continuing walk", walk_error(err)),
            }
        }

        debug!(
            "Found {} candidate files under {}",
            files.len(),
            self.root.display()
        );
        files
    }
}

/// Strips wildcards and leading dots: `*.TS`, `.ts` and `ts` all become `ts`
pub fn normalize_extension(ext: &str) -> String {
    ext.trim()
        .trim_start_matches('*')
        .trim_start_matches('.')
        .to_lowercase()
}

/// `path` relative to `root`, joined with `/` on every platform
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_error(err: ignore::Error) -> ScanError {
    match err {
        ignore::Error::WithPath { path, err } => ScanError::directory_read(path, err.to_string()),
        ignore::Error::WithDepth { err, .. } => walk_error(*err),
        other => ScanError::directory_read(PathBuf::new(), other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn config(exts: &[&str], folders: &[&str], patterns: &[&str]) -> ScanConfig {
        ScanConfig {
            include_extensions: exts.iter().map(|s| s.to_string()).collect(),
            exclude_folders: folders.iter().map(|s| s.to_string()).collect(),
            exclude_patterns: patterns.iter().map(|s| s.to_string()).collect(),
            ..ScanConfig::default()
        }
    }

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "// TODO: x\n").unwrap();
    }

    fn walked(walker: &DirectoryWalker) -> Vec<String> {
        let mut files: Vec<String> = walker
            .walk()
            .iter()
            .map(|p| relative_path(walker.root(), p))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".ts"), "ts");
        assert_eq!(normalize_extension("*.TS"), "ts");
        assert_eq!(normalize_extension("rs"), "rs");
        assert_eq!(normalize_extension(" *.py "), "py");
    }

    #[test]
    fn test_has_included_extension() {
        let walker = DirectoryWalker::new("/tmp", &config(&[".ts"], &[], &[]));
        assert!(walker.has_included_extension(Path::new("test.ts")));
        assert!(walker.has_included_extension(Path::new("TEST.TS")));
        assert!(!walker.has_included_extension(Path::new("test.txt")));
        assert!(!walker.has_included_extension(Path::new("ts")));
        assert!(!walker.has_included_extension(Path::new(".ts")));
    }

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let root = Path::new("/work/project");
        let path = root.join("src").join("app").join("main.ts");
        assert_eq!(relative_path(root, &path), "src/app/main.ts");
    }

    #[test]
    fn test_walk_filters_by_extension() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "test.ts");
        touch(dir.path(), "test.txt");
        touch(dir.path(), "nested/deep/more.TS");

        let walker = DirectoryWalker::new(dir.path(), &config(&[".ts"], &[], &[]));
        assert_eq!(walked(&walker), vec!["nested/deep/more.TS", "test.ts"]);
    }

    #[test]
    fn test_walk_skips_excluded_folder_names() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "src/main.rs");
        touch(dir.path(), "target/debug/build.rs");
        touch(dir.path(), "crates/a/target/gen.rs");

        let walker = DirectoryWalker::new(dir.path(), &config(&["rs"], &["target"], &[]));
        assert_eq!(walked(&walker), vec!["src/main.rs"]);
    }

    #[test]
    fn test_walk_skips_glob_matches() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "index.js");
        touch(dir.path(), "node_modules/lodash/index.js");
        touch(dir.path(), "web/node_modules/react/index.js");
        touch(dir.path(), "web/src/app.js");

        let walker =
            DirectoryWalker::new(dir.path(), &config(&["js"], &[], &["**/node_modules/**"]));
        assert_eq!(walked(&walker), vec!["index.js", "web/src/app.js"]);
    }

    #[test]
    fn test_glob_exclusion_is_root_relative() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "generated/a.rs");
        touch(dir.path(), "src/generated/b.rs");

        let walker = DirectoryWalker::new(dir.path(), &config(&["rs"], &[], &["generated"]));
        assert_eq!(walked(&walker), vec!["src/generated/b.rs"]);
    }

    #[test]
    fn test_hidden_files_are_not_special() {
        let dir = tempdir().unwrap();
        touch(dir.path(), ".config/settings.rs");
        fs::write(dir.path().join(".gitignore"), "*.rs\n").unwrap();

        let walker = DirectoryWalker::new(dir.path(), &config(&["rs"], &[], &[]));
        assert_eq!(walked(&walker), vec![".config/settings.rs"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        touch(dir.path(), "locked/secret.rs");
        touch(dir.path(), "open/visible.rs");
        touch(dir.path(), "top.rs");

        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Running with privileges that ignore permissions
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let walker = DirectoryWalker::new(dir.path(), &config(&["rs"], &[], &[]));
        let files = walked(&walker);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(files, vec!["open/visible.rs", "top.rs"]);
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let dir = tempdir().unwrap();
        let walker = DirectoryWalker::new(dir.path().join("absent"), &config(&["rs"], &[], &[]));
        assert!(walker.walk().is_empty());
    }
}
