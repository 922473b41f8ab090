use regex::Regex;

use crate::errors::{ScanError, ScanResult};
use crate::results::Priority;

/// Everything a single line contributes to a [`TodoItem`](crate::TodoItem)
/// apart from its location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// The matched keyword, upper-cased
    pub kind: String,
    /// `"[KIND] cleaned text"`
    pub content: String,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Recognizes TODO-style markers in comment lines and pulls out their metadata.
///
/// Comment forms are tried in a fixed order and the first one that matches
/// decides the result:
///
/// 1. `// KEYWORD ...`
/// 2. `/* KEYWORD ... */` (closing delimiter optional)
/// 3. `# KEYWORD ...`
/// 4. `<!-- KEYWORD ... -->` (closing delimiter optional)
///
/// The comment must start the line, ignoring indentation. The keyword may be
/// followed by a colon and must be followed by some text.
///
/// All expressions are compiled in [`TodoParser::new`]; parsing a line never
/// allocates a regex.
#[derive(Debug, Clone)]
pub struct TodoParser {
    comment_patterns: Vec<Regex>,
    priority: Regex,
    assignee: Regex,
    tag: Regex,
    whitespace: Regex,
    leading_colon: Regex,
}

impl TodoParser {
    /// Builds a parser for the given keywords. With no keywords the parser
    /// never matches.
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> ScanResult<Self> {
        let alternation = keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .map(keyword_pattern)
            .collect::<Vec<_>>()
            .join("|");

        let comment_patterns = if alternation.is_empty() {
            Vec::new()
        } else {
            [
                format!(r"(?i)^\s*//\s*({})\s*:?\s*(.+)", alternation),
                format!(r"(?i)^\s*/\*\s*({})\s*:?\s*(.+?)(?:\*/|$)", alternation),
                format!(r"(?i)^\s*#\s*({})\s*:?\s*(.+)", alternation),
                format!(r"(?i)^\s*<!--\s*({})\s*:?\s*(.+?)(?:-->|$)", alternation),
            ]
            .iter()
            .map(|p| compile(p))
            .collect::<ScanResult<Vec<_>>>()?
        };

        Ok(Self {
            comment_patterns,
            priority: compile(r"(?i)(?-u:\b)(HIGH|MEDIUM|LOW|H|M|L)(?-u:\b)\s*[:\-]?\s*")?,
            assignee: compile(r"@([0-9A-Za-z_]+)")?,
            tag: compile(r"#([0-9A-Za-z_]+)")?,
            whitespace: compile(r"\s+")?,
            leading_colon: compile(r"^\s*:\s*")?,
        })
    }

    /// Parses one line, returning `None` when it carries no marker
    pub fn parse_line(&self, line: &str) -> Option<ParsedLine> {
        let caps = self
            .comment_patterns
            .iter()
            .find_map(|pattern| pattern.captures(line))?;

        let kind = caps[1].to_uppercase();
        let body = caps[2].trim();

        let priority_match = self.priority.captures(body);
        let priority = priority_match
            .as_ref()
            .and_then(|c| Priority::from_token(&c[1]));

        let assignee = self.assignee.captures(body).map(|c| c[1].to_string());

        let tags: Vec<String> = self
            .tag
            .captures_iter(body)
            .map(|c| c[1].to_string())
            .collect();
        let tags = (!tags.is_empty()).then_some(tags);

        // Removal order matters: priority first, then every assignee and tag
        let mut cleaned = match priority_match.as_ref().and_then(|c| c.get(0)) {
            Some(m) => format!("{}{}", &body[..m.start()], &body[m.end()..]),
            None => body.to_string(),
        };
        cleaned = self.assignee.replace_all(&cleaned, "").into_owned();
        cleaned = self.tag.replace_all(&cleaned, "").into_owned();
        cleaned = self.whitespace.replace_all(&cleaned, " ").into_owned();
        cleaned = self.leading_colon.replace(&cleaned, "").into_owned();

        Some(ParsedLine {
            content: format!("[{}] {}", kind, cleaned.trim()),
            kind,
            priority,
            assignee,
            tags,
        })
    }
}

/// Escapes a keyword and, when it ends in a word character, requires a word
/// boundary after it. Word characters are ASCII only.
fn keyword_pattern(keyword: &str) -> String {
    let ends_in_word = keyword
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    if ends_in_word {
        format!(r"{}(?-u:\b)", regex::escape(keyword))
    } else {
        regex::escape(keyword)
    }
}

fn compile(pattern: &str) -> ScanResult<Regex> {
    Regex::new(pattern).map_err(|e| ScanError::invalid_pattern(e.to_string()))
}
