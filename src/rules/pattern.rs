//! Identifier patterns used by every rule kind.
//!
//! Two forms are accepted:
//!
//! - **Wildcard** (`/blog/*`, `/+/`, `*`): `*` matches any run of characters
//!   (possibly empty), `+` any non-empty run. A leading slash is added when
//!   missing, and a trailing slash unless the pattern ends in `*` or `/`.
//!   So `/blog/*` matches `/blog/` as well as `/blog/2024/first/`, and the bare
//!   `*` matches every identifier.
//! - **Regex**: a regular expression, anchored at both ends.

use super::RuleError;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Source {
    Wildcard(String),
    Regex(String),
}

#[derive(Debug, Clone)]
pub struct Pattern {
    source: Source,
    regex: Regex,
}

impl Pattern {
    pub fn wildcard(pattern: &str) -> Result<Self, RuleError> {
        let regex = compile(&wildcard_to_regex(pattern), pattern)?;
        Ok(Self {
            source: Source::Wildcard(pattern.to_string()),
            regex,
        })
    }

    pub fn regex(pattern: &str) -> Result<Self, RuleError> {
        let regex = compile(&format!("^(?:{pattern})$"), pattern)?;
        Ok(Self {
            source: Source::Regex(pattern.to_string()),
            regex,
        })
    }

    pub fn matches(&self, identifier: &str) -> bool {
        self.regex.is_match(identifier)
    }

    /// The pattern as the user wrote it.
    pub fn as_str(&self) -> &str {
        match &self.source {
            Source::Wildcard(s) | Source::Regex(s) => s,
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.source.serialize(serializer)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Wildcard(s) => f.write_str(s),
            Source::Regex(s) => write!(f, "/{s}/"),
        }
    }
}

fn compile(regex: &str, pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(regex).map_err(|source| RuleError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut normalized = String::with_capacity(pattern.len() + 2);
    if !pattern.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(pattern);
    if !normalized.ends_with('*') && !normalized.ends_with('/') {
        normalized.push('/');
    }

    let mut regex = String::from("^");
    let mut buf = [0u8; 4];
    for c in normalized.chars() {
        match c {
            '*' => regex.push_str("(.*?)"),
            '+' => regex.push_str("(.+?)"),
            other => regex.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    regex.push('$');
    regex
}
