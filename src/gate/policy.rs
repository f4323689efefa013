//! Protected path matching
//!
//! Patterns are either exact paths (`/profile`) or prefixes ending in the
//! wildcard suffix (`/admin/*` matches every path starting with `/admin/`).
//! Matching is case-sensitive and performs no normalization.

/// Suffix that turns a pattern into a prefix match.
pub const WILDCARD_SUFFIX: &str = "/*";

/// Ordered set of protected path patterns, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct ProtectedPaths {
    patterns: Vec<String>,
}

impl ProtectedPaths {
    /// Create from configured patterns, keeping their order.
    #[must_use]
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    /// The configured patterns.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// First pattern matching `path`, if any.
    #[must_use]
    pub fn matching_pattern(&self, path: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|pattern| matches_pattern(pattern, path))
            .map(String::as_str)
    }

    /// Whether `path` requires authentication.
    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        self.matching_pattern(path).is_some()
    }
}

/// Match one pattern against `path`.
fn matches_pattern(pattern: &str, path: &str) -> bool {
    if pattern.ends_with(WILDCARD_SUFFIX) {
        // keep the trailing slash: `/admin/*` must not match `/adminx`
        path.starts_with(&pattern[..pattern.len() - 1])
    } else {
        path == pattern
    }
}
