//! Dependencies between items and layouts.
//!
//! While a rep compiles, everything its filters read from *other* items, and
//! every layout it is rendered in, is recorded as an edge
//! `item → entity`. Before the next compile the edges answer one question:
//! is this item outdated because something it used is outdated?
//!
//! The graph is stored as `dependencies.json` next to the checksum store.
//! The edges of an item are dropped right before it is recompiled and
//! re-recorded as its filters run, so stale edges never survive a rebuild.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;
use tracing::debug;

/// Name of the dependency store within the tmp directory.
const STORE_FILENAME: &str = "dependencies.json";

/// Bump to discard stores written by an incompatible version.
const STORE_VERSION: u32 = 1;

/// Something a rep can depend on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "identifier", rename_all = "lowercase")]
pub enum Entity {
    Item(String),
    Layout(String),
}

impl Entity {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Item(id) | Self::Layout(id) => id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredGraph {
    version: u32,
    edges: Vec<(Entity, Entity)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyTracker {
    edges: BTreeMap<Entity, BTreeSet<Entity>>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the tmp directory. Missing, corrupt or outdated stores load
    /// as an empty graph.
    pub fn load(tmp_dir: &Path) -> Self {
        let path = tmp_dir.join(STORE_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::new(),
        };
        let stored: StoredGraph = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "discarding unreadable dependency store");
                return Self::new();
            }
        };
        if stored.version != STORE_VERSION {
            debug!(found = stored.version, expected = STORE_VERSION, "discarding dependency store");
            return Self::new();
        }
        let mut tracker = Self::new();
        for (from, on) in stored.edges {
            tracker.record_dependency(from, on);
        }
        tracker
    }

    /// Save to the tmp directory, creating it if needed.
    pub fn save(&self, tmp_dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(tmp_dir)?;
        let stored = StoredGraph {
            version: STORE_VERSION,
            edges: self
                .edges
                .iter()
                .flat_map(|(from, ons)| ons.iter().map(move |on| (from.clone(), on.clone())))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&stored)?;
        std::fs::write(tmp_dir.join(STORE_FILENAME), json)
    }

    /// Record that `from` used `on`. Self-edges are ignored.
    pub fn record_dependency(&mut self, from: Entity, on: Entity) {
        if from == on {
            return;
        }
        self.edges.entry(from).or_default().insert(on);
    }

    /// Direct dependencies of an entity.
    pub fn dependencies_of(&self, entity: &Entity) -> impl Iterator<Item = &Entity> {
        self.edges.get(entity).into_iter().flatten()
    }

    pub fn forget_dependencies_for(&mut self, entity: &Entity) {
        self.edges.remove(entity);
    }

    /// Drop the edges of every entity for which `keep` returns false.
    pub fn retain_sources<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Entity) -> bool,
    {
        self.edges.retain(|from, _| keep(from));
    }

    /// True if any entity reachable from `entity` is outdated by `is_outdated`.
    ///
    /// Cycles in the graph are fine; every entity is visited at most once.
    pub fn outdated_due_to_dependencies<F>(&self, entity: &Entity, mut is_outdated: F) -> bool
    where
        F: FnMut(&Entity) -> bool,
    {
        let mut visited = BTreeSet::new();
        visited.insert(entity.clone());
        let mut stack: Vec<&Entity> = self.dependencies_of(entity).collect();

        while let Some(dep) = stack.pop() {
            if !visited.insert(dep.clone()) {
                continue;
            }
            if is_outdated(dep) {
                return true;
            }
            stack.extend(self.dependencies_of(dep));
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(id: &str) -> Entity {
        Entity::Item(id.to_string())
    }

    fn layout(id: &str) -> Entity {
        Entity::Layout(id.to_string())
    }

    // =========================================================================
    // Recording
    // =========================================================================

    #[test]
    fn records_and_forgets_edges() {
        let mut deps = DependencyTracker::new();
        deps.record_dependency(item("/a/"), item("/b/"));
        deps.record_dependency(item("/a/"), layout("/default/"));
        deps.record_dependency(item("/a/"), item("/b/"));

        let direct: Vec<&Entity> = deps.dependencies_of(&item("/a/")).collect();
        assert_eq!(direct, vec![&item("/b/"), &layout("/default/")]);

        deps.forget_dependencies_for(&item("/a/"));
        assert_eq!(deps.dependencies_of(&item("/a/")).count(), 0);
        assert!(deps.is_empty());
    }

    #[test]
    fn retain_sources_drops_edges_of_removed_entities() {
        let mut deps = DependencyTracker::new();
        deps.record_dependency(item("/gone/"), item("/b/"));
        deps.record_dependency(item("/kept/"), item("/b/"));

        deps.retain_sources(|from| *from != item("/gone/"));
        assert_eq!(deps.dependencies_of(&item("/gone/")).count(), 0);
        assert_eq!(deps.dependencies_of(&item("/kept/")).count(), 1);
    }

    #[test]
    fn self_edges_are_ignored() {
        let mut deps = DependencyTracker::new();
        deps.record_dependency(item("/a/"), item("/a/"));
        assert!(deps.is_empty());
    }

    // =========================================================================
    // Outdatedness propagation
    // =========================================================================

    #[test]
    fn direct_dependency_makes_outdated() {
        let mut deps = DependencyTracker::new();
        deps.record_dependency(item("/a/"), layout("/default/"));
        assert!(deps.outdated_due_to_dependencies(&item("/a/"), |e| *e == layout("/default/")));
        assert!(!deps.outdated_due_to_dependencies(&item("/a/"), |_| false));
    }

    #[test]
    fn transitive_dependency_makes_outdated() {
        let mut deps = DependencyTracker::new();
        deps.record_dependency(item("/a/"), item("/b/"));
        deps.record_dependency(item("/b/"), item("/c/"));
        assert!(deps.outdated_due_to_dependencies(&item("/a/"), |e| *e == item("/c/")));
    }

    #[test]
    fn entity_itself_does_not_count() {
        let mut deps = DependencyTracker::new();
        deps.record_dependency(item("/a/"), item("/b/"));
        assert!(!deps.outdated_due_to_dependencies(&item("/a/"), |e| *e == item("/a/")));
    }

    #[test]
    fn cycles_terminate() {
        let mut deps = DependencyTracker::new();
        deps.record_dependency(item("/a/"), item("/b/"));
        deps.record_dependency(item("/b/"), item("/a/"));
        let mut checks = 0;
        let outdated = deps.outdated_due_to_dependencies(&item("/a/"), |_| {
            checks += 1;
            false
        });
        assert!(!outdated);
        assert_eq!(checks, 1);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    #[test]
    fn save_and_load() {
        let tmp = TempDir::new().unwrap();
        let mut deps = DependencyTracker::new();
        deps.record_dependency(item("/a/"), item("/b/"));
        deps.record_dependency(item("/a/"), layout("/default/"));
        deps.save(&tmp.path().join("tmp")).unwrap();

        let loaded = DependencyTracker::load(&tmp.path().join("tmp"));
        assert_eq!(loaded, deps);
    }

    #[test]
    fn missing_store_loads_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(DependencyTracker::load(tmp.path()).is_empty());
    }

    #[test]
    fn corrupt_store_loads_empty() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(STORE_FILENAME), "{ nope").unwrap();
        assert!(DependencyTracker::load(tmp.path()).is_empty());
    }

    #[test]
    fn version_mismatch_loads_empty() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(STORE_FILENAME),
            r#"{"version": 99, "edges": [[{"type":"item","identifier":"/a/"},{"type":"item","identifier":"/b/"}]]}"#,
        )
        .unwrap();
        assert!(DependencyTracker::load(tmp.path()).is_empty());
    }
}
