//! Path matching for gate exclusions.
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Prefix and extension checks only, no regex, so matching stays O(n)
//!   in the number of configured rules

/// Trait for matching request paths against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the path matches this condition.
    fn matches(&self, path: &str) -> bool;
}

/// Matches a path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }
}

/// Matches paths whose last segment has a file extension, unless the
/// extension is in the exception list.
#[derive(Debug, Clone)]
pub struct ExtensionMatcher {
    except: Vec<String>,
}

impl ExtensionMatcher {
    pub fn new(except: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            except: except.into_iter().map(|e| e.into().to_ascii_lowercase()).collect(),
        }
    }
}

impl Matcher for ExtensionMatcher {
    fn matches(&self, path: &str) -> bool {
        let segment = path.rsplit('/').next().unwrap_or(path);
        match segment.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                !self.except.iter().any(|e| *e == ext)
            }
            _ => false,
        }
    }
}

/// Combines multiple matchers with OR semantics.
#[derive(Debug, Default)]
pub struct AnyMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AnyMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn push(&mut self, matcher: Box<dyn Matcher>) {
        self.matchers.push(matcher);
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl Matcher for AnyMatcher {
    fn matches(&self, path: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_prefix_matcher() {
        let matcher = PathPrefixMatcher::new("/_next/static");
        assert!(matcher.matches("/_next/static/chunks/main.js"));
        assert!(!matcher.matches("/_next/data/build/index.json"));
        assert!(!matcher.matches("/_NEXT/static/x"));
    }

    #[test]
    fn test_extension_matcher() {
        let matcher = ExtensionMatcher::new(["ts", "tsx"]);
        assert!(matcher.matches("/images/logo.png"));
        assert!(matcher.matches("/docs/report.PDF"));
        assert!(!matcher.matches("/src/page.tsx"));
        assert!(!matcher.matches("/lib/util.ts"));
        assert!(!matcher.matches("/dashboard"));
        assert!(!matcher.matches("/v1.2/plans"));
        assert!(!matcher.matches("/.env"));
    }

    #[test]
    fn test_any_matcher() {
        let matcher = AnyMatcher::new(vec![
            Box::new(PathPrefixMatcher::new("/favicon.ico")),
            Box::new(PathPrefixMatcher::new("/_next/image")),
        ]);
        assert!(matcher.matches("/favicon.ico"));
        assert!(matcher.matches("/_next/image?url=x"));
        assert!(!matcher.matches("/login"));
        assert!(!AnyMatcher::default().matches("/login"));
    }
}
