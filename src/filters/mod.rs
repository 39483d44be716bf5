//! Content filters.
//!
//! A filter turns one string into another. The compiler looks filters up by
//! name in a [`FilterRegistry`] and never cares what they do; everything a
//! filter may know about the site goes through its [`FilterContext`].
//!
//! ## Reading other reps
//!
//! [`FilterContext::snapshot`] is how a filter pulls in content from another
//! rep. If that rep has not been compiled yet the call fails with
//! [`FilterError::UnmetDependency`]; the filter should propagate it with `?`
//! and the scheduler retries the current rep once the other one is done.
//!
//! Every item a filter reads (content, attributes or path) is recorded and
//! becomes a dependency of the rep being compiled.
//!
//! ## Built-ins
//!
//! | Name | Does |
//! |------|------|
//! | `markdown` | CommonMark to HTML |
//! | `template` | `{{ key }}` substitution, see [`template`] |
//! | `excerpt` | truncates to `length` characters ending in `omission` |

pub mod excerpt;
pub mod markdown;
pub mod template;

use crate::dependency::Entity;
use crate::item::{Item, Layout, lookup_attribute};
use crate::rep::{ItemRep, RepId, SnapshotName};
use crate::site::Site;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Parameters passed to a filter invocation.
pub type Params = BTreeMap<String, Value>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    /// Another rep must be compiled first. Not a failure: the scheduler requeues.
    #[error("unmet dependency on rep {0}")]
    UnmetDependency(RepId),
    #[error("no item with identifier {0}")]
    UnknownItem(String),
    #[error("item {identifier} has no rep named `{rep}`")]
    UnknownRep { identifier: String, rep: String },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParam { name: String, reason: String },
    #[error("{0}")]
    Failed(String),
}

/// A named content transformation.
pub trait Filter: Send + Sync {
    fn run(&self, content: &str, ctx: &FilterContext<'_>, params: &Params)
    -> Result<String, FilterError>;
}

struct FnFilter<F>(F);

impl<F> Filter for FnFilter<F>
where
    F: Fn(&str, &FilterContext<'_>, &Params) -> Result<String, FilterError> + Send + Sync,
{
    fn run(
        &self,
        content: &str,
        ctx: &FilterContext<'_>,
        params: &Params,
    ) -> Result<String, FilterError> {
        (self.0)(content, ctx, params)
    }
}

/// Filters by name. Registering a name twice replaces the earlier filter.
#[derive(Default)]
pub struct FilterRegistry {
    filters: BTreeMap<String, Box<dyn Filter>>,
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `markdown`, `template` and `excerpt`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("markdown", markdown::Markdown);
        registry.register("template", template::Template);
        registry.register("excerpt", excerpt::Excerpt);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, filter: impl Filter + 'static) {
        self.filters.insert(name.into(), Box::new(filter));
    }

    /// Register a closure as a filter.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&str, &FilterContext<'_>, &Params) -> Result<String, FilterError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, FnFilter(f));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Filter> {
        self.filters.get(name).map(|f| f.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.filters.keys()).finish()
    }
}

/// What a filter can see while it runs.
pub struct FilterContext<'a> {
    site: &'a Site,
    rep: RepId,
    layout: Option<&'a Layout>,
    laid_out: Option<&'a str>,
    reads: RefCell<BTreeSet<Entity>>,
}

impl<'a> FilterContext<'a> {
    /// Context for a filter step of `rep`.
    pub fn new(site: &'a Site, rep: RepId) -> Self {
        Self {
            site,
            rep,
            layout: None,
            laid_out: None,
            reads: RefCell::new(BTreeSet::new()),
        }
    }

    /// Context for rendering `layout` around the current content of `rep`.
    pub fn for_layout(site: &'a Site, rep: RepId, layout: &'a Layout, laid_out: &'a str) -> Self {
        Self {
            layout: Some(layout),
            laid_out: Some(laid_out),
            ..Self::new(site, rep)
        }
    }

    pub fn site(&self) -> &'a Site {
        self.site
    }

    pub fn rep_id(&self) -> RepId {
        self.rep
    }

    pub fn rep(&self) -> &'a ItemRep {
        self.site.rep(self.rep)
    }

    pub fn item(&self) -> &'a Item {
        self.site.item(self.rep().item())
    }

    pub fn identifier(&self) -> &'a str {
        &self.item().identifier
    }

    /// The layout being rendered, if this is a layout step.
    pub fn layout(&self) -> Option<&'a Layout> {
        self.layout
    }

    /// The content being laid out, if this is a layout step.
    pub fn content(&self) -> Option<&'a str> {
        self.laid_out
    }

    /// Attribute of the item being compiled, through all three lookup tiers.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.item().attribute(name, self.site.item_defaults())
    }

    /// A value from the `[site]` table of the configuration.
    pub fn site_setting(&self, key: &str) -> Option<&'a Value> {
        self.site.config().site.get(key)
    }

    /// Content of another rep at a named snapshot.
    ///
    /// Fails with [`FilterError::UnmetDependency`] when that rep has not been
    /// compiled yet.
    pub fn snapshot(
        &self,
        identifier: &str,
        rep_name: &str,
        snapshot: SnapshotName,
    ) -> Result<String, FilterError> {
        let rep_id = self.resolve_rep(identifier, rep_name)?;
        let rep = self.site.rep(rep_id);
        if !rep.is_compiled() {
            return Err(FilterError::UnmetDependency(rep_id));
        }
        rep.snapshot(snapshot)
            .map(str::to_string)
            .ok_or_else(|| FilterError::Failed(format!("{identifier} has no {snapshot} snapshot")))
    }

    /// Public path of another rep, `None` when it is not written.
    pub fn path_of(&self, identifier: &str, rep_name: &str) -> Result<Option<String>, FilterError> {
        let rep_id = self.resolve_rep(identifier, rep_name)?;
        Ok(self.site.rep(rep_id).path().map(str::to_string))
    }

    /// Attribute of another item, through all three lookup tiers.
    pub fn item_attribute(&self, identifier: &str, name: &str) -> Result<Option<Value>, FilterError> {
        let item = self.resolve_item(identifier)?;
        Ok(lookup_attribute(&item.attributes, self.site.item_defaults(), name))
    }

    /// Items read through this context.
    pub fn into_reads(self) -> BTreeSet<Entity> {
        self.reads.into_inner()
    }

    fn resolve_item(&self, identifier: &str) -> Result<&'a Item, FilterError> {
        let id = self
            .site
            .find_item(identifier)
            .ok_or_else(|| FilterError::UnknownItem(identifier.to_string()))?;
        let item = self.site.item(id);
        self.record_read(item);
        Ok(item)
    }

    fn resolve_rep(&self, identifier: &str, rep_name: &str) -> Result<RepId, FilterError> {
        let item = self.resolve_item(identifier)?;
        self.site
            .find_rep(&item.identifier, rep_name)
            .ok_or_else(|| FilterError::UnknownRep {
                identifier: item.identifier.clone(),
                rep: rep_name.to_string(),
            })
    }

    fn record_read(&self, item: &Item) {
        if item.identifier != self.identifier() {
            self.reads
                .borrow_mut()
                .insert(Entity::Item(item.identifier.clone()));
        }
    }
}

/// Read an optional non-negative integer parameter.
pub(crate) fn usize_param(params: &Params, name: &str) -> Result<Option<usize>, FilterError> {
    match params.get(name) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| FilterError::InvalidParam {
                name: name.to_string(),
                reason: format!("expected a non-negative integer, got {v}"),
            }),
    }
}

/// Read an optional string parameter.
pub(crate) fn str_param<'p>(params: &'p Params, name: &str) -> Result<Option<&'p str>, FilterError> {
    match params.get(name) {
        None => Ok(None),
        Some(v) => v.as_str().map(Some).ok_or_else(|| FilterError::InvalidParam {
            name: name.to_string(),
            reason: format!("expected a string, got {v}"),
        }),
    }
}

/// Read an optional boolean parameter.
pub(crate) fn bool_param(params: &Params, name: &str) -> Result<Option<bool>, FilterError> {
    match params.get(name) {
        None => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or_else(|| FilterError::InvalidParam {
            name: name.to_string(),
            reason: format!("expected true or false, got {v}"),
        }),
    }
}
