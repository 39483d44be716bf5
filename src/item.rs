//! Source entities: items, layouts, and code snippets.
//!
//! Everything the compiler works on is loaded once per run and never mutated
//! afterwards. Items and layouts are addressed by an *identifier*, a path-like
//! string that always has a leading and a trailing slash:
//!
//! ```text
//! content/index.md          → /
//! content/about.md          → /about/
//! content/blog/first.md     → /blog/first/
//! layouts/default.html      → /default/
//! ```
//!
//! ## Attribute lookup
//!
//! Attributes resolve through three tiers, first hit wins:
//!
//! ```text
//! item attributes  →  [item_defaults] in config.toml  →  hardcoded defaults
//! ```
//!
//! The hardcoded tier only knows the handful of keys the engine itself
//! consults (see [`hardcoded_default`]).

use crate::rep::RepId;
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute map attached to items, layouts, and site defaults.
///
/// A `BTreeMap` so that serialization (and therefore fingerprinting) is
/// independent of insertion order.
pub type Attributes = BTreeMap<String, Value>;

/// Index of an item within its [`Site`](crate::site::Site).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub usize);

/// Normalize an identifier to the `/a/b/` form.
///
/// - `"about"` → `"/about/"`
/// - `"/blog/first"` → `"/blog/first/"`
/// - `""` or `"/"` → `"/"`
/// - `"//a//b//"` → `"/a/b/"`
pub fn clean_identifier(raw: &str) -> String {
    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", segments.join("/"))
    }
}

/// A unit of source content.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub identifier: String,
    pub content: String,
    pub attributes: Attributes,
    pub(crate) reps: Vec<RepId>,
}

impl Item {
    pub fn new(
        content: impl Into<String>,
        attributes: Attributes,
        identifier: impl AsRef<str>,
    ) -> Self {
        Self {
            identifier: clean_identifier(identifier.as_ref()),
            content: content.into(),
            attributes,
            reps: Vec::new(),
        }
    }

    /// Representations built for this item, in rule order.
    pub fn reps(&self) -> &[RepId] {
        &self.reps
    }

    /// Resolve an attribute through the three lookup tiers.
    pub fn attribute(&self, name: &str, site_defaults: &Attributes) -> Option<Value> {
        lookup_attribute(&self.attributes, site_defaults, name)
    }

    /// Resolve a boolean attribute; anything that isn't `true` counts as false.
    pub fn flag(&self, name: &str, site_defaults: &Attributes) -> bool {
        matches!(self.attribute(name, site_defaults), Some(Value::Bool(true)))
    }
}

/// A template that reps can be laid out in.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub identifier: String,
    pub content: String,
    pub attributes: Attributes,
}

impl Layout {
    pub fn new(
        content: impl Into<String>,
        attributes: Attributes,
        identifier: impl AsRef<str>,
    ) -> Self {
        Self {
            identifier: clean_identifier(identifier.as_ref()),
            content: content.into(),
            attributes,
        }
    }
}

/// Auxiliary code shipped with a site (the `lib/` directory).
///
/// The engine never executes it; it is tracked only so that a change to any
/// snippet marks every rep as outdated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSnippet {
    pub name: String,
    pub data: String,
}

impl CodeSnippet {
    pub fn new(data: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Values for the attributes the engine itself relies on.
///
/// | Key | Default | Used by |
/// |-----|---------|---------|
/// | `extension` | `"html"` | route templates (`{extension}`) |
/// | `filename` | `"index"` | route templates (`{filename}`) |
/// | `is_draft` | `false` | dropped at load time when true |
/// | `skip_output` | `false` | compiled but never written when true |
pub fn hardcoded_default(name: &str) -> Option<Value> {
    match name {
        "extension" => Some(Value::String("html".into())),
        "filename" => Some(Value::String("index".into())),
        "is_draft" | "skip_output" => Some(Value::Bool(false)),
        _ => None,
    }
}

/// Three-tier lookup shared by items and filter contexts.
pub fn lookup_attribute(own: &Attributes, site_defaults: &Attributes, name: &str) -> Option<Value> {
    own.get(name)
        .or_else(|| site_defaults.get(name))
        .cloned()
        .or_else(|| hardcoded_default(name))
}

/// Render an attribute value as plain text.
///
/// Strings are emitted without quotes; `null` becomes the empty string;
/// arrays and tables fall back to their JSON form.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
