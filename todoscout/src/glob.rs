//! Exclude-pattern matching.
//!
//! Glob text is translated to an anchored regular expression once, when the
//! set is built. Only three wildcards are understood:
//!
//! * `**` matches any run of characters, `/` included. A leading `**/`
//!   also matches zero directories and a trailing `/**` also matches the
//!   directory itself, so `**/node_modules/**` excludes `node_modules` at
//!   any depth, the root level included.
//! * `*` matches any run of characters except `/`.
//! * `?` matches exactly one character except `/`.
//!
//! Everything else is literal, so brackets and braces never change meaning.
use regex::Regex;
use tracing::{debug, warn};

/// A single compiled exclude pattern
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    pattern: String,
    regex: Regex,
}

impl GlobMatcher {
    /// Compiles a glob pattern into an anchored matcher
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let source = translate(pattern);
        debug!("Compiled glob '{}' to /{}/", pattern, source);
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(&source)?,
        })
    }

    /// The glob text this matcher was built from
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Tests a root-relative path. Backslashes are treated as separators.
    pub fn matches(&self, relative_path: &str) -> bool {
        self.regex.is_match(&normalize_separators(relative_path))
    }
}

/// An ordered collection of exclude patterns
#[derive(Debug, Clone, Default)]
pub struct GlobSet {
    matchers: Vec<GlobMatcher>,
}

impl GlobSet {
    /// Compiles every pattern. A pattern the regex engine refuses (only
    /// possible past its size limit) is logged and left out.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let matchers = patterns
            .iter()
            .filter_map(|p| match GlobMatcher::new(p.as_ref()) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("Ignoring exclude pattern '{}': {}", p.as_ref(), e);
                    None
                }
            })
            .collect();
        Self { matchers }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    /// True when any pattern matches the whole path
    pub fn is_match(&self, relative_path: &str) -> bool {
        let normalized = normalize_separators(relative_path);
        self.matchers.iter().any(|m| m.regex.is_match(&normalized))
    }
}

/// Converts host separators to `/`
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let double_star = c == '*' && chars.get(i + 1) == Some(&'*');
        let trailing_double_star = c == '/' && i + 3 == chars.len() && chars[i + 1..] == ['*', '*'];

        if trailing_double_star {
            out.push_str("(?:/.*)?");
            i += 3;
        } else if double_star && chars.get(i + 2) == Some(&'/') {
            out.push_str("(?:.*/)?");
            i += 3;
        } else if double_star {
            out.push_str(".*");
            i += 2;
        } else if c == '*' {
            out.push_str("[^/]*");
            i += 1;
        } else if c == '?' {
            out.push_str("[^/]");
            i += 1;
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            i += 1;
        }
    }

    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(p: &str) -> GlobMatcher {
        GlobMatcher::new(p).unwrap()
    }

    #[test]
    fn test_double_star_crosses_separators() {
        let m = glob("**/node_modules/**");
        assert!(m.matches("node_modules"));
        assert!(m.matches("web/node_modules"));
        assert!(m.matches("web/app/node_modules/lodash"));
        assert!(!m.matches("web/node_modules_old"));
        assert!(!m.matches("my_node_modules"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let m = glob("src/*.generated");
        assert!(m.matches("src/api.generated"));
        assert!(!m.matches("src/nested/api.generated"));

        let m = glob("build*");
        assert!(m.matches("build"));
        assert!(m.matches("build-cache"));
        assert!(!m.matches("build/cache"));
    }

    #[test]
    fn test_question_mark_is_one_char() {
        let m = glob("tmp?");
        assert!(m.matches("tmp1"));
        assert!(!m.matches("tmp"));
        assert!(!m.matches("tmp12"));
        assert!(!m.matches("tmp/"));
    }

    #[test]
    fn test_match_is_anchored() {
        let m = glob("dist");
        assert!(m.matches("dist"));
        assert!(!m.matches("src/dist"));
        assert!(!m.matches("distribution"));
    }

    #[test]
    fn test_metacharacters_are_literal() {
        let m = glob("out.[a-z]+");
        assert!(m.matches("out.[a-z]+"));
        assert!(!m.matches("outx"));
        assert!(!m.matches("out.b"));

        let m = glob("a.b");
        assert!(!m.matches("axb"));
    }

    #[test]
    fn test_backslashes_are_normalized() {
        let m = glob("**/coverage/**");
        assert!(m.matches(r"packages\core\coverage"));
    }

    #[test]
    fn test_inner_double_star() {
        let m = glob("a**b");
        assert!(m.matches("ab"));
        assert!(m.matches("a/x/b"));
        assert!(!m.matches("a/x/c"));
    }

    #[test]
    fn test_glob_set() {
        let set = GlobSet::new(&["**/dist/**", "logs"]);
        assert_eq!(set.len(), 2);
        assert!(set.is_match("packages/web/dist"));
        assert!(set.is_match("logs"));
        assert!(!set.is_match("src/logs"));
        assert!(!set.is_match("src"));

        let empty = GlobSet::new::<&str>(&[]);
        assert!(empty.is_empty());
        assert!(!empty.is_match("anything"));
    }
}
