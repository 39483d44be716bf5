//! Shared test utilities for the kiln test suite.
//!
//! Builders for in-memory sites with reps already built, plus lookup and
//! mutation helpers for the state a compile would normally produce.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let mut site = site_with_items(&[("/a/", "A"), ("/b/", "B")]);
//! let b = rep_of(&site, "/b/", "default");
//! mark_compiled(&mut site, b, "<p>B</p>");
//! ```

use serde_json::Value;
use std::path::Path;

use crate::config::SiteConfig;
use crate::data_source::{DataSource, DataSourceError, MemoryDataSource};
use crate::item::{Attributes, CodeSnippet, Item, Layout};
use crate::rep::{RepId, Snapshots};
use crate::rules::{CompilationRule, Pattern, RoutingRule, RuleSet};
use crate::site::Site;

// =========================================================================
// Rules
// =========================================================================

/// One catch-all `default` rep with no steps and no routes.
pub fn default_rules() -> RuleSet {
    let mut rules = RuleSet::new();
    rules.add_compilation_rule(CompilationRule::new(
        Pattern::wildcard("*").unwrap(),
        "default",
        vec![],
    ));
    rules
}

/// [`default_rules`] plus a route to `{identifier}index.html`.
pub fn routed_rules() -> RuleSet {
    let mut rules = default_rules();
    rules.add_routing_rule(RoutingRule::new(
        Pattern::wildcard("*").unwrap(),
        "default",
        Some("{identifier}index.html".to_string()),
    ));
    rules
}

// =========================================================================
// Sites
// =========================================================================

fn items_from(items: &[(&str, &str)]) -> Vec<Item> {
    items
        .iter()
        .map(|(id, content)| Item::new(*content, Attributes::new(), id))
        .collect()
}

fn build(config: SiteConfig, items: Vec<Item>, layouts: Vec<Layout>) -> Site {
    let mut site = Site::new("/site", config, items, layouts, vec![]).unwrap();
    site.prepare(&default_rules()).unwrap();
    site
}

/// An unrouted site with one `default` rep per item.
pub fn site_with_items(items: &[(&str, &str)]) -> Site {
    build(SiteConfig::default(), items_from(items), vec![])
}

/// Like [`site_with_items`], with attributes per item.
pub fn site_with_attrs(items: &[(&str, &str, &[(&str, Value)])]) -> Site {
    let items = items
        .iter()
        .map(|(id, content, attrs)| {
            let attrs = attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            Item::new(*content, attrs, id)
        })
        .collect();
    build(SiteConfig::default(), items, vec![])
}

/// Like [`site_with_items`], with site-wide item defaults.
pub fn site_with_defaults(items: &[(&str, &str)], defaults: &[(&str, Value)]) -> Site {
    let config = SiteConfig {
        item_defaults: defaults
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
        ..SiteConfig::default()
    };
    build(config, items_from(items), vec![])
}

pub fn site_with_layouts(items: &[(&str, &str)], layouts: &[(&str, &str)]) -> Site {
    let layouts = layouts
        .iter()
        .map(|(id, content)| Layout::new(*content, Attributes::new(), id))
        .collect();
    build(SiteConfig::default(), items_from(items), layouts)
}

/// A site rooted at `root`, prepared with `rules`. Nothing is written.
pub fn routed_site(root: &Path, items: &[(&str, &str)], rules: &RuleSet) -> Site {
    routed_site_from(root, items_from(items), rules)
}

pub fn routed_site_from(root: &Path, items: Vec<Item>, rules: &RuleSet) -> Site {
    let mut site = Site::new(root, SiteConfig::default(), items, vec![], vec![]).unwrap();
    site.prepare(rules).unwrap();
    site
}

/// Create every routed output file with placeholder content.
pub fn write_outputs(site: &Site) {
    for rep in site.reps() {
        for output in rep.outputs().values() {
            std::fs::create_dir_all(output.disk.parent().unwrap()).unwrap();
            std::fs::write(&output.disk, "written").unwrap();
        }
    }
}

// =========================================================================
// Lookups and mutation
// =========================================================================

/// Rep of an item by name. Panics with the available reps if missing.
pub fn rep_of(site: &Site, identifier: &str, rep_name: &str) -> RepId {
    site.find_rep(identifier, rep_name).unwrap_or_else(|| {
        let available: Vec<String> = site.rep_ids().map(|r| site.rep_label(r)).collect();
        panic!("no rep {identifier} ({rep_name}), available: {available:?}")
    })
}

/// Complete a rep as if it had compiled to `content`.
pub fn mark_compiled(site: &mut Site, rep: RepId, content: &str) {
    let raw = site.item(site.rep(rep).item()).content.clone();
    let mut snapshots = Snapshots::start(raw);
    snapshots.set_last(content.to_string());
    snapshots.finish();
    site.rep_mut(rep).complete(snapshots);
}

pub fn set_site_setting(site: &mut Site, key: &str, value: Value) {
    site.config_mut().site.insert(key.to_string(), value);
}

pub fn add_code_snippet(site: &mut Site, snippet: CodeSnippet) {
    site.code_snippets_mut().push(snippet);
}

// =========================================================================
// Data sources
// =========================================================================

/// Wraps a memory source, counting lifecycle calls and optionally failing
/// `items()`.
pub struct CountingSource {
    inner: MemoryDataSource,
    item_failure: Option<String>,
    pub uses: usize,
    pub unuses: usize,
}

impl CountingSource {
    pub fn new(inner: MemoryDataSource) -> Self {
        Self {
            inner,
            item_failure: None,
            uses: 0,
            unuses: 0,
        }
    }

    pub fn failing_items(mut self, message: &str) -> Self {
        self.item_failure = Some(message.to_string());
        self
    }
}

impl DataSource for CountingSource {
    fn use_source(&mut self) -> Result<(), DataSourceError> {
        self.uses += 1;
        self.inner.use_source()
    }

    fn unuse_source(&mut self) {
        self.unuses += 1;
        self.inner.unuse_source();
    }

    fn configuration(&self) -> Result<SiteConfig, DataSourceError> {
        self.inner.configuration()
    }

    fn items(&self) -> Result<Vec<Item>, DataSourceError> {
        if let Some(message) = &self.item_failure {
            return Err(DataSourceError::Other(message.clone()));
        }
        self.inner.items()
    }

    fn layouts(&self) -> Result<Vec<Layout>, DataSourceError> {
        self.inner.layouts()
    }

    fn code_snippets(&self) -> Result<Vec<CodeSnippet>, DataSourceError> {
        self.inner.code_snippets()
    }
}
