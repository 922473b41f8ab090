//! Output types of a scan.
//!
//! A scan yields a flat `Vec<TodoItem>` rather than a map keyed by file:
//! items from one file stay in line order, and consumers that want grouping
//! (the exporters, the Slack digest) build it themselves with
//! [`group_by_file`].
use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority parsed from a `HIGH`/`MEDIUM`/`LOW` (or `H`/`M`/`L`) token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Maps a priority token, in any case, to its level
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "HIGH" | "H" => Some(Self::High),
            "MEDIUM" | "M" => Some(Self::Medium),
            "LOW" | "L" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One marker found in a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    /// Path relative to the scan root, always `/`-separated
    pub file_path: String,
    /// 1-based line number
    pub line_number: usize,
    /// `"[KIND] text"` with metadata tokens removed from the text
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// In order of appearance, duplicates kept. Never `Some(vec![])`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl TodoItem {
    /// Trailing `[HIGH] @alice #ui` style suffix used by the text renderers
    pub fn metadata_suffix(&self) -> String {
        let mut suffix = String::new();
        if let Some(priority) = self.priority {
            suffix.push_str(&format!(" [{}]", priority.as_str().to_uppercase()));
        }
        if let Some(assignee) = &self.assignee {
            suffix.push_str(&format!(" @{}", assignee));
        }
        if let Some(tags) = &self.tags {
            let joined: Vec<String> = tags.iter().map(|t| format!("#{}", t)).collect();
            suffix.push(' ');
            suffix.push_str(&joined.join(" "));
        }
        suffix
    }
}

/// The result of scanning a tree
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    /// Items in discovery order; line order within each file
    pub items: Vec<TodoItem>,
    /// Files that were read and parsed
    pub files_scanned: usize,
    /// Files that could not be read
    pub files_failed: usize,
    /// Files that contributed at least one item
    pub files_with_todos: usize,
}

impl ScanOutput {
    /// Creates a new empty output
    pub fn new() -> Self {
        Default::default()
    }

    /// Records one file's contribution
    pub fn add_file_items(&mut self, items: Vec<TodoItem>) {
        self.files_scanned += 1;
        if !items.is_empty() {
            self.files_with_todos += 1;
            self.items.extend(items);
        }
    }

    /// Records a file that could not be read
    pub fn add_failed_file(&mut self) {
        self.files_failed += 1;
    }

    pub fn total_todos(&self) -> usize {
        self.items.len()
    }

    /// Items ordered by `(file_path, line_number)`, the only order that is
    /// stable across runs
    pub fn sorted(&self) -> Vec<TodoItem> {
        let mut items = self.items.clone();
        items.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then(a.line_number.cmp(&b.line_number))
        });
        items
    }
}

/// Groups items by file, keeping the order in which files first appear
pub fn group_by_file(items: &[TodoItem]) -> Vec<(&str, Vec<&TodoItem>)> {
    let mut groups: Vec<(&str, Vec<&TodoItem>)> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|(path, _)| *path == item.file_path) {
            Some((_, group)) => group.push(item),
            None => groups.push((item.file_path.as_str(), vec![item])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: &str, line: usize) -> TodoItem {
        TodoItem {
            file_path: path.to_string(),
            line_number: line,
            content: "[TODO] something".to_string(),
            priority: None,
            assignee: None,
            tags: None,
        }
    }

    #[test]
    fn test_priority_from_token() {
        assert_eq!(Priority::from_token("HIGH"), Some(Priority::High));
        assert_eq!(Priority::from_token("h"), Some(Priority::High));
        assert_eq!(Priority::from_token("Medium"), Some(Priority::Medium));
        assert_eq!(Priority::from_token("m"), Some(Priority::Medium));
        assert_eq!(Priority::from_token("low"), Some(Priority::Low));
        assert_eq!(Priority::from_token("L"), Some(Priority::Low));
        assert_eq!(Priority::from_token("urgent"), None);
    }

    #[test]
    fn test_metadata_suffix() {
        let mut todo = item("a.rs", 1);
        assert_eq!(todo.metadata_suffix(), "");

        todo.priority = Some(Priority::High);
        todo.assignee = Some("alice".to_string());
        todo.tags = Some(vec!["ui".to_string(), "ui".to_string()]);
        assert_eq!(todo.metadata_suffix(), " [HIGH] @alice #ui #ui");
    }

    #[test]
    fn test_serialization_omits_unset_fields() {
        let json = serde_json::to_value(item("src/a.ts", 3)).unwrap();
        assert_eq!(json["filePath"], "src/a.ts");
        assert_eq!(json["lineNumber"], 3);
        assert!(json.get("priority").is_none());
        assert!(json.get("tags").is_none());

        let mut todo = item("src/a.ts", 3);
        todo.priority = Some(Priority::Medium);
        let json = serde_json::to_value(todo).unwrap();
        assert_eq!(json["priority"], "medium");
    }

    #[test]
    fn test_scan_output_counts() {
        let mut output = ScanOutput::new();
        output.add_file_items(vec![item("a.rs", 1), item("a.rs", 5)]);
        output.add_file_items(vec![]);
        output.add_failed_file();

        assert_eq!(output.total_todos(), 2);
        assert_eq!(output.files_scanned, 2);
        assert_eq!(output.files_with_todos, 1);
        assert_eq!(output.files_failed, 1);
    }

    #[test]
    fn test_sorted_orders_by_path_then_line() {
        let mut output = ScanOutput::new();
        output.add_file_items(vec![item("b.rs", 2), item("b.rs", 9)]);
        output.add_file_items(vec![item("a.rs", 7)]);

        let keys: Vec<(String, usize)> = output
            .sorted()
            .into_iter()
            .map(|t| (t.file_path, t.line_number))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("a.rs".to_string(), 7),
                ("b.rs".to_string(), 2),
                ("b.rs".to_string(), 9)
            ]
        );
    }

    #[test]
    fn test_group_by_file_keeps_first_seen_order() {
        let items = vec![item("b.rs", 1), item("a.rs", 1), item("b.rs", 4)];
        let groups = group_by_file(&items);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "b.rs");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "a.rs");
    }
}
