//! Item representations and their content snapshots.
//!
//! An item is compiled into one or more *reps* (e.g. `default` for the HTML
//! page, `feed` for an Atom entry). Each rep carries its content at four
//! named stages:
//!
//! | Snapshot | Content |
//! |----------|---------|
//! | `raw` | the untouched item source |
//! | `pre` | after the filters that run before the first layout |
//! | `post` | after layouts and post-layout filters |
//! | `last` | whatever the most recent step produced |
//!
//! While a rule is running only `raw` and `last` move; `pre` is frozen when
//! the first layout step starts and `post` when the rule finishes. After a
//! rep is compiled, `last` equals `post`.

use crate::item::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Name used when a rule does not name its rep.
pub const DEFAULT_REP: &str = "default";

/// Index of a rep within its [`Site`](crate::site::Site).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepId(pub usize);

impl fmt::Display for RepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotName {
    Raw,
    Pre,
    Post,
    Last,
}

impl SnapshotName {
    pub const ALL: [SnapshotName; 4] = [Self::Raw, Self::Pre, Self::Post, Self::Last];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Pre => "pre",
            Self::Post => "post",
            Self::Last => "last",
        }
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Self::Raw),
            "pre" => Ok(Self::Pre),
            "post" => Ok(Self::Post),
            "last" => Ok(Self::Last),
            other => Err(format!(
                "unknown snapshot `{other}` (expected raw, pre, post or last)"
            )),
        }
    }
}

/// Staged content of a rep during and after compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshots {
    raw: String,
    pre: Option<String>,
    post: Option<String>,
    last: String,
}

impl Snapshots {
    /// Start a compilation from the item's source.
    pub fn start(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            last: raw.clone(),
            raw,
            pre: None,
            post: None,
        }
    }

    pub fn last(&self) -> &str {
        &self.last
    }

    pub fn set_last(&mut self, content: String) {
        self.last = content;
    }

    /// Freeze `pre` from the current content unless it is already set.
    pub fn freeze_pre(&mut self) {
        if self.pre.is_none() {
            self.pre = Some(self.last.clone());
        }
    }

    /// Freeze `pre` (when no layout ran) and `post` from the final content.
    pub fn finish(&mut self) {
        self.freeze_pre();
        self.post = Some(self.last.clone());
    }

    pub fn get(&self, name: SnapshotName) -> Option<&str> {
        match name {
            SnapshotName::Raw => Some(&self.raw),
            SnapshotName::Pre => self.pre.as_deref(),
            SnapshotName::Post => self.post.as_deref(),
            SnapshotName::Last => Some(&self.last),
        }
    }
}

/// Where a rep snapshot is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPath {
    /// Path returned by the routing rule, always starting with `/`.
    pub routed: String,
    /// Public path: `routed` with a trailing `index.html` dropped.
    pub web: String,
    /// Absolute location under the output directory.
    pub disk: PathBuf,
}

/// One compiled variant of an item.
#[derive(Debug, Clone)]
pub struct ItemRep {
    item: ItemId,
    name: String,
    compiled: bool,
    snapshots: Option<Snapshots>,
    outputs: BTreeMap<SnapshotName, OutputPath>,
}

impl ItemRep {
    pub fn new(item: ItemId, name: impl Into<String>) -> Self {
        Self {
            item,
            name: name.into(),
            compiled: false,
            snapshots: None,
            outputs: BTreeMap::new(),
        }
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Content at a named stage, if that stage has been reached.
    pub fn snapshot(&self, name: SnapshotName) -> Option<&str> {
        self.snapshots.as_ref().and_then(|s| s.get(name))
    }

    pub fn outputs(&self) -> &BTreeMap<SnapshotName, OutputPath> {
        &self.outputs
    }

    /// Output binding of the final content, if the rep is routed at all.
    pub fn output(&self) -> Option<&OutputPath> {
        self.outputs.get(&SnapshotName::Last)
    }

    /// Public path of the final content.
    pub fn path(&self) -> Option<&str> {
        self.output().map(|o| o.web.as_str())
    }

    pub(crate) fn bind_output(&mut self, snapshot: SnapshotName, output: OutputPath) {
        self.outputs.insert(snapshot, output);
    }

    pub(crate) fn complete(&mut self, snapshots: Snapshots) {
        self.snapshots = Some(snapshots);
        self.compiled = true;
    }
}
