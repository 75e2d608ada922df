//! Compiled exclusion rules.
//!
//! Two tiers:
//! - excluded paths never enter the gate and are forwarded untouched;
//! - static paths skip the security checks but still get session refresh
//!   and security headers.
//!
//! Prefixes are compared against the raw path, so a path carrying a `.` or
//! `..` segment (literal or percent-encoded) never matches either tier.

use crate::config::ExclusionConfig;
use crate::routing::matcher::{AnyMatcher, ExtensionMatcher, Matcher, PathPrefixMatcher};

#[derive(Debug)]
pub struct Exclusions {
    bypass: AnyMatcher,
    static_assets: AnyMatcher,
}

impl Exclusions {
    pub fn from_config(config: &ExclusionConfig) -> Self {
        let mut bypass = AnyMatcher::default();
        for prefix in &config.prefixes {
            bypass.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
        }
        bypass.push(Box::new(ExtensionMatcher::new(
            config.extension_exceptions.iter().cloned(),
        )));

        let mut static_assets = AnyMatcher::default();
        for prefix in &config.static_prefixes {
            static_assets.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
        }

        Self {
            bypass,
            static_assets,
        }
    }

    /// The gate does not run at all for this path.
    pub fn bypasses_gate(&self, path: &str) -> bool {
        !has_dot_segment(path) && self.bypass.matches(path)
    }

    /// The gate runs only session refresh and header augmentation.
    pub fn is_static_asset(&self, path: &str) -> bool {
        !has_dot_segment(path) && self.static_assets.matches(path)
    }
}

/// Whether any segment of `path` is `.` or `..`, including `%2e` forms.
pub fn has_dot_segment(path: &str) -> bool {
    path.split('/').any(|segment| {
        let segment = segment.to_ascii_lowercase().replace("%2e", ".");
        segment == "." || segment == ".."
    })
}

impl Default for Exclusions {
    fn default() -> Self {
        Self::from_config(&ExclusionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bypass() {
        let ex = Exclusions::default();
        assert!(ex.bypasses_gate("/_next/static/chunks/app.js"));
        assert!(ex.bypasses_gate("/_next/image"));
        assert!(ex.bypasses_gate("/favicon.ico"));
        assert!(ex.bypasses_gate("/logo.svg"));
        assert!(!ex.bypasses_gate("/app/page.tsx"));
        assert!(!ex.bypasses_gate("/login"));
        assert!(!ex.bypasses_gate("/api/auth/callback"));
    }

    #[test]
    fn test_default_static_assets() {
        let ex = Exclusions::default();
        assert!(ex.is_static_asset("/_next/webpack-hmr"));
        assert!(ex.is_static_asset("/assets/fonts"));
        assert!(!ex.is_static_asset("/login"));
    }

    #[test]
    fn test_dot_segments_never_excluded() {
        let ex = Exclusions::default();
        assert!(!ex.bypasses_gate("/_next/static/../../../etc/passwd"));
        assert!(!ex.bypasses_gate("/_next/static/%2e%2e/admin.json"));
        assert!(!ex.is_static_asset("/assets/../admin/users"));
        assert!(!ex.is_static_asset("/static/./secret"));
        assert!(!ex.is_static_asset("/static/%2E%2e/secret"));
        assert!(ex.is_static_asset("/static/app..v2/main"));
    }

    #[test]
    fn test_has_dot_segment() {
        assert!(has_dot_segment("/a/../b"));
        assert!(has_dot_segment("/a/."));
        assert!(has_dot_segment("/a/.%2E/b"));
        assert!(!has_dot_segment("/a/.well-known/b"));
        assert!(!has_dot_segment("/file.txt"));
    }
}
