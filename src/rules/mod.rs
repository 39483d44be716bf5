//! The rule engine.
//!
//! A [`RuleSet`] holds three ordered lists:
//!
//! | List | Answers |
//! |------|---------|
//! | compilation rules | which steps produce a rep's snapshots |
//! | routing rules | where a rep snapshot is written, if anywhere |
//! | layout filter rules | which filter renders a layout |
//!
//! Every lookup walks its list in registration order and returns the first
//! entry whose pattern matches (and, for item rules, whose rep name is the
//! one asked for). Declaration order is priority: a specific pattern listed
//! after a catch-all never wins.
//!
//! Rules are normally loaded from `rules.toml` (see [`file`]), but they are
//! plain data and can be built in code.

pub mod file;
pub mod pattern;

pub use file::{load_rules, parse_rules};
pub use pattern::Pattern;

use crate::filters::Params;
use crate::rep::{DEFAULT_REP, SnapshotName};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse rules file {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("{section} rule #{index}: {reason}")]
    InvalidRule {
        section: &'static str,
        index: usize,
        reason: String,
    },
}

/// One step of a compilation rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "lowercase")]
pub enum Step {
    /// Run a named filter over the current content.
    Filter { name: String, params: Params },
    /// Render the current content inside a layout.
    Layout { identifier: String },
}

impl Step {
    pub fn filter(name: impl Into<String>) -> Self {
        Self::Filter {
            name: name.into(),
            params: Params::new(),
        }
    }

    pub fn filter_with(name: impl Into<String>, params: Params) -> Self {
        Self::Filter {
            name: name.into(),
            params,
        }
    }

    pub fn layout(identifier: &str) -> Self {
        Self::Layout {
            identifier: crate::item::clean_identifier(identifier),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompilationRule {
    pub pattern: Pattern,
    pub rep_name: String,
    pub steps: Vec<Step>,
}

impl CompilationRule {
    pub fn new(pattern: Pattern, rep_name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            pattern,
            rep_name: rep_name.into(),
            steps,
        }
    }

    pub fn applies_to(&self, identifier: &str, rep_name: &str) -> bool {
        self.rep_name == rep_name && self.pattern.matches(identifier)
    }
}

/// Where a rep snapshot goes.
///
/// `path` is a template; `None` means the matching reps are never written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingRule {
    pub pattern: Pattern,
    pub rep_name: String,
    pub snapshot: SnapshotName,
    pub path: Option<String>,
}

impl RoutingRule {
    pub fn new(pattern: Pattern, rep_name: impl Into<String>, path: Option<String>) -> Self {
        Self {
            pattern,
            rep_name: rep_name.into(),
            snapshot: SnapshotName::Last,
            path,
        }
    }

    pub fn for_snapshot(mut self, snapshot: SnapshotName) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn applies_to(&self, identifier: &str, rep_name: &str) -> bool {
        self.rep_name == rep_name && self.pattern.matches(identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutFilterRule {
    pub pattern: Pattern,
    pub filter: String,
    pub params: Params,
}

impl LayoutFilterRule {
    pub fn new(pattern: Pattern, filter: impl Into<String>, params: Params) -> Self {
        Self {
            pattern,
            filter: filter.into(),
            params,
        }
    }
}

/// All rules of a site, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleSet {
    compilation_rules: Vec<CompilationRule>,
    routing_rules: Vec<RoutingRule>,
    layout_filter_rules: Vec<LayoutFilterRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_compilation_rule(&mut self, rule: CompilationRule) {
        self.compilation_rules.push(rule);
    }

    pub fn add_routing_rule(&mut self, rule: RoutingRule) {
        self.routing_rules.push(rule);
    }

    pub fn add_layout_filter_rule(&mut self, rule: LayoutFilterRule) {
        self.layout_filter_rules.push(rule);
    }

    pub fn compilation_rules(&self) -> &[CompilationRule] {
        &self.compilation_rules
    }

    pub fn routing_rules(&self) -> &[RoutingRule] {
        &self.routing_rules
    }

    pub fn layout_filter_rules(&self) -> &[LayoutFilterRule] {
        &self.layout_filter_rules
    }

    /// First compilation rule for this identifier and rep name.
    pub fn compilation_rule_for(&self, identifier: &str, rep_name: &str) -> Option<&CompilationRule> {
        self.compilation_rules
            .iter()
            .find(|r| r.applies_to(identifier, rep_name))
    }

    /// First routing rule for this identifier, rep name and snapshot.
    pub fn routing_rule_for(
        &self,
        identifier: &str,
        rep_name: &str,
        snapshot: SnapshotName,
    ) -> Option<&RoutingRule> {
        self.routing_rules
            .iter()
            .find(|r| r.snapshot == snapshot && r.applies_to(identifier, rep_name))
    }

    /// The winning routing rule of every snapshot that has one.
    pub fn routing_rules_for(
        &self,
        identifier: &str,
        rep_name: &str,
    ) -> BTreeMap<SnapshotName, &RoutingRule> {
        let mut rules = BTreeMap::new();
        for rule in &self.routing_rules {
            if rule.applies_to(identifier, rep_name) {
                rules.entry(rule.snapshot).or_insert(rule);
            }
        }
        rules
    }

    /// Filter name and parameters for rendering a layout.
    pub fn filter_for_layout(&self, layout_identifier: &str) -> Option<(&str, &Params)> {
        self.layout_filter_rules
            .iter()
            .find(|r| r.pattern.matches(layout_identifier))
            .map(|r| (r.filter.as_str(), &r.params))
    }

    /// Distinct rep names whose compilation rules match, in first-appearance order.
    pub fn rep_names_for(&self, identifier: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for rule in &self.compilation_rules {
            if rule.pattern.matches(identifier) && !names.contains(&rule.rep_name) {
                names.push(rule.rep_name.clone());
            }
        }
        names
    }
}

/// Rep name used when a rule file entry omits `rep`.
pub(crate) fn default_rep_name() -> String {
    DEFAULT_REP.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wc(p: &str) -> Pattern {
        Pattern::wildcard(p).unwrap()
    }

    fn params(pairs: &[(&str, serde_json::Value)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // =========================================================================
    // Compilation rules
    // =========================================================================

    #[test]
    fn first_registered_compilation_rule_wins() {
        let mut rules = RuleSet::new();
        rules.add_compilation_rule(CompilationRule::new(
            wc("*"),
            "default",
            vec![Step::filter("catch_all")],
        ));
        rules.add_compilation_rule(CompilationRule::new(
            wc("/blog/*"),
            "default",
            vec![Step::filter("specific")],
        ));

        let rule = rules.compilation_rule_for("/blog/first/", "default").unwrap();
        assert_eq!(rule.steps, vec![Step::filter("catch_all")]);
    }

    #[test]
    fn compilation_rule_must_match_rep_name() {
        let mut rules = RuleSet::new();
        rules.add_compilation_rule(CompilationRule::new(wc("*"), "feed", vec![]));
        rules.add_compilation_rule(CompilationRule::new(
            wc("*"),
            "default",
            vec![Step::filter("markdown")],
        ));

        let rule = rules.compilation_rule_for("/a/", "default").unwrap();
        assert_eq!(rule.rep_name, "default");
        assert!(rules.compilation_rule_for("/a/", "print").is_none());
    }

    #[test]
    fn no_matching_compilation_rule_is_none() {
        let mut rules = RuleSet::new();
        rules.add_compilation_rule(CompilationRule::new(wc("/blog/*"), "default", vec![]));
        assert!(rules.compilation_rule_for("/about/", "default").is_none());
    }

    #[test]
    fn rep_names_in_first_appearance_order() {
        let mut rules = RuleSet::new();
        rules.add_compilation_rule(CompilationRule::new(wc("/blog/*"), "feed", vec![]));
        rules.add_compilation_rule(CompilationRule::new(wc("*"), "default", vec![]));
        rules.add_compilation_rule(CompilationRule::new(wc("/blog/*"), "default", vec![]));

        assert_eq!(rules.rep_names_for("/blog/first/"), vec!["feed", "default"]);
        assert_eq!(rules.rep_names_for("/about/"), vec!["default"]);
    }

    // =========================================================================
    // Routing rules
    // =========================================================================

    #[test]
    fn first_routing_rule_per_snapshot() {
        let mut rules = RuleSet::new();
        rules.add_routing_rule(RoutingRule::new(wc("*"), "default", Some("/first.html".into())));
        rules.add_routing_rule(RoutingRule::new(wc("*"), "default", Some("/second.html".into())));
        rules.add_routing_rule(
            RoutingRule::new(wc("*"), "default", Some("/raw.txt".into()))
                .for_snapshot(SnapshotName::Raw),
        );

        let routes = rules.routing_rules_for("/a/", "default");
        assert_eq!(routes.len(), 2);
        assert_eq!(
            routes[&SnapshotName::Last].path.as_deref(),
            Some("/first.html")
        );
        assert_eq!(routes[&SnapshotName::Raw].path.as_deref(), Some("/raw.txt"));

        let rule = rules
            .routing_rule_for("/a/", "default", SnapshotName::Last)
            .unwrap();
        assert_eq!(rule.path.as_deref(), Some("/first.html"));
    }

    #[test]
    fn routing_rule_without_path_shadows_later_rules() {
        let mut rules = RuleSet::new();
        rules.add_routing_rule(RoutingRule::new(wc("/drafts/*"), "default", None));
        rules.add_routing_rule(RoutingRule::new(wc("*"), "default", Some("/x.html".into())));

        let rule = rules
            .routing_rule_for("/drafts/a/", "default", SnapshotName::Last)
            .unwrap();
        assert_eq!(rule.path, None);
    }

    // =========================================================================
    // Layout filter rules
    // =========================================================================

    #[test]
    fn filter_for_layout_is_first_registered() {
        let mut rules = RuleSet::new();
        rules.add_layout_filter_rule(LayoutFilterRule::new(
            wc("*"),
            "template",
            params(&[("strict", json!(true))]),
        ));
        rules.add_layout_filter_rule(LayoutFilterRule::new(wc("/feed/"), "xml", Params::new()));

        let (filter, params) = rules.filter_for_layout("/feed/").unwrap();
        assert_eq!(filter, "template");
        assert_eq!(params["strict"], json!(true));
    }

    #[test]
    fn filter_for_layout_without_match_is_none() {
        let mut rules = RuleSet::new();
        rules.add_layout_filter_rule(LayoutFilterRule::new(wc("/a/"), "template", Params::new()));
        assert!(rules.filter_for_layout("/b/").is_none());
    }

    #[test]
    fn step_layout_cleans_identifier() {
        assert_eq!(
            Step::layout("default"),
            Step::Layout {
                identifier: "/default/".into()
            }
        );
    }
}
