//! Suspicious request detection.
//!
//! A best-effort heuristic over the raw request target, not a WAF. Paths
//! that legitimately contain `..` or `/.` are flagged (false positives) and
//! any encoding the literal patterns do not cover slips through (false
//! negatives). Injection must still be prevented in the application itself.

use std::fmt;

use regex::Regex;
use serde::Serialize;

/// Which family of attack signature matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternClass {
    Traversal,
    SqlInjection,
    ScriptInjection,
    ShellExec,
}

impl PatternClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Traversal => "traversal",
            Self::SqlInjection => "sql_injection",
            Self::ScriptInjection => "script_injection",
            Self::ShellExec => "shell_exec",
        }
    }
}

impl fmt::Display for PatternClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
struct NamedPattern {
    class: PatternClass,
    regex: Regex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Clean,
    Suspicious(PatternClass),
}

/// Ordered list of named signatures; first match wins.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    patterns: Vec<NamedPattern>,
}

const DEFAULT_PATTERNS: &[(PatternClass, &str)] = &[
    (PatternClass::Traversal, r"\.\.|/\."),
    (
        PatternClass::SqlInjection,
        r"(?i)(union|select|insert|update|delete|drop|create|alter)\s",
    ),
    (
        PatternClass::ScriptInjection,
        r"(?i)(<script|javascript:|data:text/html|<iframe)",
    ),
    (
        PatternClass::ShellExec,
        r"(?i)\b(eval|exec|system|passthru|shell_exec)\b",
    ),
];

impl PatternDetector {
    /// Detector with the built-in traversal, SQL, script and shell signatures.
    pub fn new() -> Self {
        let patterns = DEFAULT_PATTERNS
            .iter()
            .filter_map(|(class, p)| match Regex::new(p) {
                Ok(regex) => Some(NamedPattern { class: *class, regex }),
                Err(e) => {
                    tracing::warn!(class = %class, error = %e, "Skipping invalid built-in pattern");
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    /// Detector with no signatures.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Append a signature under `class`.
    pub fn with_pattern(mut self, class: PatternClass, pattern: &str) -> Result<Self, regex::Error> {
        self.patterns.push(NamedPattern {
            class,
            regex: Regex::new(pattern)?,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Scan the path and query (without the leading `?`) as one string.
    pub fn scan(&self, path: &str, query: &str) -> ScanOutcome {
        self.scan_target(&request_target(path, query))
    }

    /// Scan an already-assembled request target.
    pub fn scan_target(&self, target: &str) -> ScanOutcome {
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(target))
            .map(|p| ScanOutcome::Suspicious(p.class))
            .unwrap_or(ScanOutcome::Clean)
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Join path and query the way they appear on the request line.
pub fn request_target(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    }
}

/// Truncate to at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
