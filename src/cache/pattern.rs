//! Glob-style invalidation patterns
//!
//! `*` matches any run of characters (including none). A pattern without `*`
//! is an exact key match. Matching is anchored at both ends, so
//! `"projects:list:*"` matches every key starting with `"projects:list:"`
//! and nothing else.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Parsed invalidation pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPattern {
    raw: String,
}

impl KeyPattern {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Pattern matching every key
    pub fn all() -> Self {
        Self::new("*")
    }

    /// Pattern matching every key under `prefix`
    pub fn prefix(prefix: &str) -> Self {
        Self::new(format!("{}*", prefix))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern names a single key
    pub fn is_exact(&self) -> bool {
        !self.raw.contains('*')
    }

    /// Literal text before the first wildcard
    pub fn literal_prefix(&self) -> &str {
        match self.raw.find('*') {
            Some(idx) => &self.raw[..idx],
            None => &self.raw,
        }
    }

    /// Match a single key
    pub fn matches(&self, key: &str) -> bool {
        glob_match(&self.raw, key)
    }

    /// Match an entry by its key or any of its tags
    pub fn matches_entry(&self, key: &str, tags: &[String]) -> bool {
        self.matches(key) || tags.iter().any(|tag| self.matches(tag))
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for KeyPattern {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for KeyPattern {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

/// Anchored glob match supporting only `*`
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    // split always yields at least one item
    let first = parts.next().unwrap_or("");
    if !text.starts_with(first) {
        return false;
    }

    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        return text == first;
    }

    let mut remaining = &text[first.len()..];
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return true,
    };

    for part in middle {
        if part.is_empty() {
            continue;
        }
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }

    remaining.ends_with(last)
}
