//! Renderers for a list of [`TodoItem`]s.
//!
//! Every renderer maps fields directly; none of them re-parse content.
//! Grouping by file happens here, not in the engine.
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;
use tracing::info;

use crate::errors::{ScanError, ScanResult};
use crate::results::{group_by_file, TodoItem};

const RULE_WIDTH: usize = 50;

/// File formats supported by [`export_to_path`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Txt,
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    /// `todos.txt`, `todos.json` or `todos.csv`
    pub fn default_file_name(&self) -> String {
        format!("todos.{}", self.extension())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Txt),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(ScanError::config_error(format!(
                "unknown export format '{}' (expected txt, json or csv)",
                other
            ))),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
    timestamp: String,
    total_count: usize,
    todos: &'a [TodoItem],
}

fn timestamp() -> String {
    humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
}

/// Grouped plain-text listing with a timestamped header
pub fn render_txt(items: &[TodoItem]) -> String {
    let mut out = format!("TODO list - {}\n", timestamp());
    out.push_str(&"=".repeat(RULE_WIDTH));
    out.push_str("\n\n");

    if items.is_empty() {
        out.push_str("No TODOs found.\n");
        return out;
    }

    for (path, group) in group_by_file(items) {
        out.push_str(&format!("{}\n", path));
        out.push_str(&"-".repeat(path.chars().count() + 4));
        out.push('\n');
        for item in group {
            out.push_str(&format!(
                "  {}: {}{}\n",
                item.line_number,
                item.content,
                item.metadata_suffix()
            ));
        }
        out.push('\n');
    }

    out.push_str(&format!("Found {} TODOs.\n", items.len()));
    out
}

/// `{ "timestamp", "totalCount", "todos" }`, pretty-printed
pub fn render_json(items: &[TodoItem]) -> ScanResult<String> {
    let export = JsonExport {
        timestamp: timestamp(),
        total_count: items.len(),
        todos: items,
    };
    serde_json::to_string_pretty(&export)
        .map_err(|e| ScanError::export_error(format!("failed to encode JSON: {}", e)))
}

/// One row per item; tags are joined with `;`
pub fn render_csv(items: &[TodoItem]) -> ScanResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |e: csv::Error| ScanError::export_error(format!("failed to encode CSV: {}", e));

    writer
        .write_record(["file_path", "line_number", "content", "priority", "assignee", "tags"])
        .map_err(csv_err)?;
    for item in items {
        let line = item.line_number.to_string();
        let priority = item.priority.map(|p| p.as_str()).unwrap_or("");
        let assignee = item.assignee.as_deref().unwrap_or("");
        let tags = item.tags.as_ref().map(|t| t.join(";")).unwrap_or_default();
        writer
            .write_record([
                item.file_path.as_str(),
                line.as_str(),
                item.content.as_str(),
                priority,
                assignee,
                tags.as_str(),
            ])
            .map_err(csv_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ScanError::export_error(format!("failed to flush CSV: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| ScanError::export_error(format!("CSV output is not UTF-8: {}", e)))
}

/// Renders `items` in `format`
pub fn render(items: &[TodoItem], format: ExportFormat) -> ScanResult<String> {
    match format {
        ExportFormat::Txt => Ok(render_txt(items)),
        ExportFormat::Json => render_json(items),
        ExportFormat::Csv => render_csv(items),
    }
}

/// Writes `items` to `path` in `format`
pub fn export_to_path(items: &[TodoItem], format: ExportFormat, path: &Path) -> ScanResult<()> {
    let rendered = render(items, format)?;
    fs::write(path, rendered).map_err(|e| ScanError::from_io(path, e))?;
    info!(
        "Exported {} TODOs as {} to {}",
        items.len(),
        format.extension(),
        path.display()
    );
    Ok(())
}

/// Colored, grouped listing for a terminal
pub fn print_to_terminal<W: Write>(items: &[TodoItem], out: &mut W) -> std::io::Result<()> {
    if items.is_empty() {
        writeln!(out, "{}", "No TODOs found.".yellow())?;
        return Ok(());
    }

    writeln!(out, "{}", "TODO list".bold())?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;

    for (path, group) in group_by_file(items) {
        writeln!(out, "\n{}", path.blue())?;
        writeln!(out, "{}", "-".repeat(path.chars().count() + 4))?;
        for item in group {
            writeln!(
                out,
                "  {}: {}{}",
                item.line_number.to_string().green(),
                item.content,
                item.metadata_suffix().cyan()
            )?;
        }
    }

    writeln!(out, "\nFound {} TODOs.", items.len())?;
    Ok(())
}
