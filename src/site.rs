//! The site: everything one compile run works on.
//!
//! A [`Site`] owns the configuration, items, layouts, code snippets and reps
//! for the duration of a run. Entities are addressed by index ([`ItemId`],
//! [`RepId`]) so that the compiler can hand out shared borrows of the whole
//! site to filters while it tracks progress separately.
//!
//! Building a site takes three steps:
//!
//! ```text
//! Site::load      data source  →  items, layouts, snippets, config (drafts dropped)
//! build_reps      rules        →  one rep per distinct matching rep name
//! route_reps      rules        →  output paths for every routed snapshot
//! ```
//!
//! [`Site::prepare`] runs the last two.

use crate::config::SiteConfig;
use crate::data_source::{DataSource, DataSourceError};
use crate::item::{Attributes, CodeSnippet, Item, ItemId, Layout, clean_identifier, value_to_text};
use crate::rep::{ItemRep, OutputPath, RepId};
use crate::rules::RuleSet;
use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

static ROUTE_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(identifier|rep|filename|extension|attr:[^}]+)\}")
        .expect("route placeholder regex is valid")
});

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Data source error: {0}")]
    DataSource(#[from] DataSourceError),
    #[error("Duplicate {kind} identifier {identifier}")]
    DuplicateIdentifier {
        kind: &'static str,
        identifier: String,
    },
    #[error("Routing rule for {rep} produced a blank path")]
    BlankRoute { rep: String },
    #[error("Routing rule for {rep} produced `{path}`, which does not start with a slash")]
    RouteWithoutSlash { rep: String, path: String },
    #[error("Routing rule for {rep} produced `{path}`, which leaves the output directory")]
    RouteEscapesOutput { rep: String, path: String },
}

#[derive(Debug)]
pub struct Site {
    root: PathBuf,
    config: SiteConfig,
    items: Vec<Item>,
    layouts: Vec<Layout>,
    code_snippets: Vec<CodeSnippet>,
    reps: Vec<ItemRep>,
    item_index: HashMap<String, ItemId>,
}

impl Site {
    /// Assemble a site from loaded entities.
    ///
    /// Drafts are dropped here. Two items (or two layouts) with the same
    /// identifier are an error.
    pub fn new(
        root: impl Into<PathBuf>,
        config: SiteConfig,
        items: Vec<Item>,
        layouts: Vec<Layout>,
        code_snippets: Vec<CodeSnippet>,
    ) -> Result<Self, SiteError> {
        let items: Vec<Item> = items
            .into_iter()
            .filter(|item| {
                let draft = item.flag("is_draft", &config.item_defaults);
                if draft {
                    debug!(identifier = %item.identifier, "skipping draft");
                }
                !draft
            })
            .collect();

        let mut item_index = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            if item_index
                .insert(item.identifier.clone(), ItemId(i))
                .is_some()
            {
                return Err(SiteError::DuplicateIdentifier {
                    kind: "item",
                    identifier: item.identifier.clone(),
                });
            }
        }

        let mut seen = BTreeSet::new();
        for layout in &layouts {
            if !seen.insert(layout.identifier.as_str()) {
                return Err(SiteError::DuplicateIdentifier {
                    kind: "layout",
                    identifier: layout.identifier.clone(),
                });
            }
        }

        Ok(Self {
            root: root.into(),
            config,
            items,
            layouts,
            code_snippets,
            reps: Vec::new(),
            item_index,
        })
    }

    /// Load a site through a data source.
    ///
    /// `unuse_source` is called whenever `use_source` succeeded, even if
    /// loading fails halfway.
    pub fn load(root: &Path, source: &mut impl DataSource) -> Result<Self, SiteError> {
        source.use_source()?;
        let loaded = load_entities(&*source);
        source.unuse_source();
        let (config, items, layouts, code_snippets) = loaded?;
        debug!(
            items = items.len(),
            layouts = layouts.len(),
            code_snippets = code_snippets.len(),
            "site loaded"
        );
        Self::new(root, config, items, layouts, code_snippets)
    }

    /// Build reps and route them.
    pub fn prepare(&mut self, rules: &RuleSet) -> Result<(), SiteError> {
        self.build_reps(rules);
        self.route_reps(rules)
    }

    /// Create one rep per distinct rep name among the matching compilation
    /// rules of each item. Replaces any existing reps.
    pub fn build_reps(&mut self, rules: &RuleSet) {
        self.reps.clear();
        for (i, item) in self.items.iter_mut().enumerate() {
            item.reps.clear();
            for name in rules.rep_names_for(&item.identifier) {
                item.reps.push(RepId(self.reps.len()));
                self.reps.push(ItemRep::new(ItemId(i), name));
            }
        }
    }

    /// Bind output paths from the routing rules.
    pub fn route_reps(&mut self, rules: &RuleSet) -> Result<(), SiteError> {
        let output_dir = self.output_dir();
        for index in 0..self.reps.len() {
            let rep_id = RepId(index);
            let rep = &self.reps[index];
            let item = &self.items[rep.item().0];

            let mut bindings = Vec::new();
            for (snapshot, rule) in rules.routing_rules_for(&item.identifier, rep.name()) {
                let Some(template) = &rule.path else {
                    continue;
                };
                let routed = self.render_route(template, item, rep.name());
                if routed.trim().is_empty() {
                    return Err(SiteError::BlankRoute {
                        rep: self.rep_label(rep_id),
                    });
                }
                if !routed.starts_with('/') {
                    return Err(SiteError::RouteWithoutSlash {
                        rep: self.rep_label(rep_id),
                        path: routed,
                    });
                }
                if routed.split(['/', '\\']).any(|segment| segment == "..") {
                    return Err(SiteError::RouteEscapesOutput {
                        rep: self.rep_label(rep_id),
                        path: routed,
                    });
                }
                bindings.push((snapshot, output_path(&output_dir, routed)));
            }

            let rep = &mut self.reps[index];
            for (snapshot, output) in bindings {
                rep.bind_output(snapshot, output);
            }
        }
        Ok(())
    }

    fn render_route(&self, template: &str, item: &Item, rep_name: &str) -> String {
        ROUTE_PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                let key = &caps[1];
                match key {
                    "identifier" => item.identifier.clone(),
                    "rep" => rep_name.to_string(),
                    "filename" | "extension" => self.attribute_text(item, key),
                    _ => match key.strip_prefix("attr:") {
                        Some(name) => self.attribute_text(item, name),
                        None => String::new(),
                    },
                }
            })
            .into_owned()
    }

    fn attribute_text(&self, item: &Item, name: &str) -> String {
        item.attribute(name, &self.config.item_defaults)
            .as_ref()
            .map(value_to_text)
            .unwrap_or_default()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn item_defaults(&self) -> &Attributes {
        &self.config.item_defaults
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.config.output_dir)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(&self.config.tmp_dir)
    }

    pub fn rules_path(&self) -> PathBuf {
        self.root.join(&self.config.rules_file)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn layouts(&self) -> &[Layout] {
        &self.layouts
    }

    pub fn code_snippets(&self) -> &[CodeSnippet] {
        &self.code_snippets
    }

    pub fn reps(&self) -> &[ItemRep] {
        &self.reps
    }

    pub fn rep_ids(&self) -> impl Iterator<Item = RepId> + use<> {
        (0..self.reps.len()).map(RepId)
    }

    pub fn item(&self, id: ItemId) -> &Item {
        &self.items[id.0]
    }

    pub fn rep(&self, id: RepId) -> &ItemRep {
        &self.reps[id.0]
    }

    pub(crate) fn rep_mut(&mut self, id: RepId) -> &mut ItemRep {
        &mut self.reps[id.0]
    }

    #[cfg(test)]
    pub(crate) fn config_mut(&mut self) -> &mut SiteConfig {
        &mut self.config
    }

    #[cfg(test)]
    pub(crate) fn code_snippets_mut(&mut self) -> &mut Vec<CodeSnippet> {
        &mut self.code_snippets
    }

    /// Item by identifier; the identifier is cleaned first.
    pub fn find_item(&self, identifier: &str) -> Option<ItemId> {
        self.item_index.get(&clean_identifier(identifier)).copied()
    }

    pub fn find_rep(&self, identifier: &str, rep_name: &str) -> Option<RepId> {
        let item = self.find_item(identifier)?;
        self.item(item)
            .reps
            .iter()
            .copied()
            .find(|&rep| self.rep(rep).name() == rep_name)
    }

    pub fn find_layout(&self, identifier: &str) -> Option<&Layout> {
        let identifier = clean_identifier(identifier);
        self.layouts.iter().find(|l| l.identifier == identifier)
    }

    /// True when the item's reps are compiled but never written.
    pub fn skips_output(&self, item: ItemId) -> bool {
        self.item(item).flag("skip_output", &self.config.item_defaults)
    }

    /// `"/identifier/ (rep)"`, used in messages.
    pub fn rep_label(&self, rep: RepId) -> String {
        let rep = self.rep(rep);
        format!("{} ({})", self.item(rep.item()).identifier, rep.name())
    }
}

type Entities = (SiteConfig, Vec<Item>, Vec<Layout>, Vec<CodeSnippet>);

fn load_entities(source: &impl DataSource) -> Result<Entities, DataSourceError> {
    Ok((
        source.configuration()?,
        source.items()?,
        source.layouts()?,
        source.code_snippets()?,
    ))
}

/// Bind a routed path under the output directory.
///
/// The public path drops a trailing `index.html`.
fn output_path(output_dir: &Path, routed: String) -> OutputPath {
    let web = match routed.strip_suffix("index.html") {
        Some(dir) if dir.ends_with('/') => dir.to_string(),
        _ => routed.clone(),
    };
    OutputPath {
        disk: output_dir.join(routed.trim_start_matches('/')),
        web,
        routed,
    }
}
