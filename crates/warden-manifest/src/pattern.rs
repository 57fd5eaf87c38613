//! Host pattern matching.
//!
//! Two matching modes appear in manifests:
//!
//! - Tool `allowed_domains` entries are [`HostPattern`]s: an exact host,
//!   a `*.suffix` wildcard, or the catch-all `*`.
//! - Counterparty allow/deny lists are plain host suffixes: the pattern
//!   matches the host itself and any subdomain of it.
//!
//! Matching is ASCII-case-insensitive; hosts are compared lowercased.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A host pattern from a tool's `allowed_domains` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostPattern(String);

impl HostPattern {
    /// Create a pattern from its string form.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into().to_ascii_lowercase())
    }

    /// The pattern's string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether a host matches this pattern.
    ///
    /// `*` matches every host. `*.example.com` matches `example.com` and
    /// any label under it. Anything else is an exact match.
    #[must_use]
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if self.0 == "*" {
            return true;
        }
        if let Some(suffix) = self.0.strip_prefix("*.") {
            return host == suffix || host.ends_with(&format!(".{suffix}"));
        }
        host == self.0
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HostPattern {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Counterparty list matching: the pattern matches the host itself and any
/// subdomain of it.
#[must_use]
pub fn host_suffix_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    host == pattern || host.ends_with(&format!(".{pattern}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let p = HostPattern::new("api.example.com");
        assert!(p.matches("api.example.com"));
        assert!(p.matches("API.Example.COM"));
        assert!(!p.matches("example.com"));
        assert!(!p.matches("evil-api.example.com.attacker.net"));
    }

    #[test]
    fn test_wildcard_suffix() {
        let p = HostPattern::new("*.example.com");
        assert!(p.matches("example.com"));
        assert!(p.matches("api.example.com"));
        assert!(p.matches("deep.api.example.com"));
        assert!(!p.matches("notexample.com"));
        assert!(!p.matches("example.com.attacker.net"));
    }

    #[test]
    fn test_catch_all() {
        let p = HostPattern::new("*");
        assert!(p.matches("anything.at.all"));
    }

    #[test]
    fn test_suffix_matching() {
        assert!(host_suffix_matches("example.com", "example.com"));
        assert!(host_suffix_matches("example.com", "shop.example.com"));
        assert!(!host_suffix_matches("example.com", "badexample.com"));
        assert!(!host_suffix_matches("example.com", "example.com.evil.net"));
    }
}
