//! `rules.toml` loader.
//!
//! ```toml
//! [[compile]]
//! pattern = "/blog/*"          # or: regex = "/blog/\\d+/"
//! rep = "default"              # optional, defaults to "default"
//! steps = [
//!   { filter = "markdown" },
//!   { layout = "/post/" },
//!   { filter = "template", params = { strict = true } },
//! ]
//!
//! [[route]]
//! pattern = "*"
//! path = "{identifier}{filename}.{extension}"   # omit to never write
//! snapshot = "last"                              # optional
//!
//! [[layout]]
//! pattern = "*"
//! filter = "template"
//! ```
//!
//! Arrays keep their order; it is the rule priority.

use super::{
    CompilationRule, LayoutFilterRule, Pattern, RoutingRule, RuleError, RuleSet, Step,
    default_rep_name,
};
use crate::filters::Params;
use crate::rep::SnapshotName;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesFile {
    #[serde(default)]
    compile: Vec<RawCompile>,
    #[serde(default)]
    route: Vec<RawRoute>,
    #[serde(default)]
    layout: Vec<RawLayout>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCompile {
    pattern: Option<String>,
    regex: Option<String>,
    #[serde(default = "default_rep_name")]
    rep: String,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStep {
    Filter {
        filter: String,
        #[serde(default)]
        params: Params,
    },
    Layout {
        layout: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRoute {
    pattern: Option<String>,
    regex: Option<String>,
    #[serde(default = "default_rep_name")]
    rep: String,
    path: Option<String>,
    snapshot: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLayout {
    pattern: Option<String>,
    regex: Option<String>,
    filter: String,
    #[serde(default)]
    params: Params,
}

/// Read and parse a rules file.
pub fn load_rules(path: &Path) -> Result<RuleSet, RuleError> {
    let content = std::fs::read_to_string(path)?;
    parse_rules(&content).map_err(|e| match e {
        RuleError::Toml { source, .. } => RuleError::Toml {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Parse rules from TOML text.
pub fn parse_rules(content: &str) -> Result<RuleSet, RuleError> {
    let file: RulesFile = toml::from_str(content).map_err(|source| RuleError::Toml {
        path: Default::default(),
        source,
    })?;

    let mut rules = RuleSet::new();

    for (index, raw) in file.compile.into_iter().enumerate() {
        let pattern = resolve_pattern("compile", index, raw.pattern, raw.regex)?;
        let steps = raw
            .steps
            .into_iter()
            .map(|step| match step {
                RawStep::Filter { filter, params } => Step::filter_with(filter, params),
                RawStep::Layout { layout } => Step::layout(&layout),
            })
            .collect();
        rules.add_compilation_rule(CompilationRule::new(pattern, raw.rep, steps));
    }

    for (index, raw) in file.route.into_iter().enumerate() {
        let pattern = resolve_pattern("route", index, raw.pattern, raw.regex)?;
        let snapshot = match raw.snapshot {
            Some(name) => name
                .parse::<SnapshotName>()
                .map_err(|reason| RuleError::InvalidRule {
                    section: "route",
                    index,
                    reason,
                })?,
            None => SnapshotName::Last,
        };
        rules.add_routing_rule(RoutingRule::new(pattern, raw.rep, raw.path).for_snapshot(snapshot));
    }

    for (index, raw) in file.layout.into_iter().enumerate() {
        let pattern = resolve_pattern("layout", index, raw.pattern, raw.regex)?;
        rules.add_layout_filter_rule(LayoutFilterRule::new(pattern, raw.filter, raw.params));
    }

    Ok(rules)
}

fn resolve_pattern(
    section: &'static str,
    index: usize,
    wildcard: Option<String>,
    regex: Option<String>,
) -> Result<Pattern, RuleError> {
    match (wildcard, regex) {
        (Some(p), None) => Pattern::wildcard(&p),
        (None, Some(r)) => Pattern::regex(&r),
        (Some(_), Some(_)) => Err(RuleError::InvalidRule {
            section,
            index,
            reason: "set either `pattern` or `regex`, not both".into(),
        }),
        (None, None) => Err(RuleError::InvalidRule {
            section,
            index,
            reason: "missing `pattern` (or `regex`)".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn parse_full_rules_file() {
        let rules = parse_rules(
            r#"
[[compile]]
pattern = "/blog/*"
steps = [
  { filter = "markdown" },
  { layout = "post" },
  { filter = "excerpt", params = { length = 10 } },
]

[[compile]]
pattern = "*"
rep = "raw"

[[route]]
pattern = "*"
path = "{identifier}index.html"

[[route]]
regex = "/drafts/.*"
snapshot = "pre"

[[layout]]
pattern = "*"
filter = "template"
"#,
        )
        .unwrap();

        let blog = &rules.compilation_rules()[0];
        assert_eq!(blog.rep_name, "default");
        assert_eq!(blog.steps.len(), 3);
        assert_eq!(blog.steps[0], Step::filter("markdown"));
        assert_eq!(
            blog.steps[1],
            Step::Layout {
                identifier: "/post/".into()
            }
        );
        match &blog.steps[2] {
            Step::Filter { name, params } => {
                assert_eq!(name, "excerpt");
                assert_eq!(params["length"], json!(10));
            }
            other => panic!("expected filter step, got {other:?}"),
        }

        assert_eq!(rules.compilation_rules()[1].rep_name, "raw");
        assert!(rules.compilation_rules()[1].steps.is_empty());

        assert_eq!(rules.routing_rules().len(), 2);
        assert_eq!(rules.routing_rules()[1].snapshot, SnapshotName::Pre);
        assert_eq!(rules.routing_rules()[1].path, None);

        assert_eq!(rules.filter_for_layout("/post/").unwrap().0, "template");
    }

    #[test]
    fn empty_file_is_empty_rule_set() {
        let rules = parse_rules("").unwrap();
        assert_eq!(rules, RuleSet::new());
    }

    #[test]
    fn missing_pattern_is_error() {
        let err = parse_rules("[[compile]]\nsteps = []").unwrap_err();
        assert!(matches!(
            err,
            RuleError::InvalidRule {
                section: "compile",
                index: 0,
                ..
            }
        ));
    }

    #[test]
    fn pattern_and_regex_together_is_error() {
        let err = parse_rules("[[layout]]\npattern = \"*\"\nregex = \".*\"\nfilter = \"t\"")
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidRule { section: "layout", .. }));
    }

    #[test]
    fn unknown_snapshot_is_error() {
        let err = parse_rules("[[route]]\npattern = \"*\"\nsnapshot = \"middle\"").unwrap_err();
        assert!(matches!(err, RuleError::InvalidRule { section: "route", .. }));
    }

    #[test]
    fn unknown_section_is_error() {
        assert!(matches!(
            parse_rules("[[preprocess]]\npattern = \"*\""),
            Err(RuleError::Toml { .. })
        ));
    }

    #[test]
    fn load_rules_reports_path_on_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rules.toml");
        std::fs::write(&path, "[[compile]\n").unwrap();
        match load_rules(&path) {
            Err(RuleError::Toml { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected TOML error, got {other:?}"),
        }
    }

    #[test]
    fn load_rules_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            load_rules(&tmp.path().join("rules.toml")),
            Err(RuleError::Io(_))
        ));
    }
}
