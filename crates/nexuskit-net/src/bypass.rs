//! URL patterns for requests the engine must never intercept.
//!
//! The original deployment skips devtools and live-reload traffic
//! (`chrome-extension`, `sockjs`, `hot-update.json`); embedders can extend
//! the list.

use url::Url;

/// A single URL pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassPattern {
    /// Exact URL match.
    Exact(String),
    /// URL starts with the given prefix.
    Prefix(String),
    /// URL contains the given substring.
    Contains(String),
}

impl BypassPattern {
    /// Check whether a URL matches this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        let s = url.as_str();
        match self {
            Self::Exact(p) => s == p,
            Self::Prefix(p) => s.starts_with(p.as_str()),
            Self::Contains(p) => s.contains(p.as_str()),
        }
    }
}

/// An ordered list of bypass patterns.
#[derive(Debug, Clone, Default)]
pub struct BypassList {
    patterns: Vec<BypassPattern>,
}

impl BypassList {
    /// Empty list; nothing is bypassed.
    pub fn new() -> Self {
        Self::default()
    }

    /// The patterns the original deployment ships with.
    pub fn standard() -> Self {
        Self {
            patterns: vec![
                BypassPattern::Contains("chrome-extension".to_string()),
                BypassPattern::Contains("sockjs".to_string()),
                BypassPattern::Contains("hot-update.json".to_string()),
            ],
        }
    }

    /// Add a pattern.
    pub fn push(&mut self, pattern: BypassPattern) {
        self.patterns.push(pattern);
    }

    /// Builder-style variant of [`push`](Self::push).
    pub fn with(mut self, pattern: BypassPattern) -> Self {
        self.push(pattern);
        self
    }

    /// Whether any pattern matches the URL.
    pub fn matches(&self, url: &Url) -> bool {
        self.patterns.iter().any(|p| p.matches(url))
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
