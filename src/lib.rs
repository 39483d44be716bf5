//! # Kiln
//!
//! A rule-driven static content compiler. Items (pages, posts, feeds) are run
//! through ordered filter and layout steps chosen by pattern-matched rules, and
//! the results are written to paths chosen by routing rules. Between runs kiln
//! keeps fingerprints of every input, so a second run only recompiles what
//! changed and what depends on it.
//!
//! # Architecture: One Compile Run
//!
//! ```text
//! 1. Load      DataSource  →  Site           (items, layouts, lib, config)
//! 2. Prepare   Site + rules →  reps           (one per rep name, routed)
//! 3. Check     fingerprints vs tmp/checksums.json  →  outdated items
//! 4. Compile   FIFO queue of reps, requeued on unmet dependencies
//! 5. Store     fresh fingerprints + dependency graph  →  tmp/
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`item`] | Content model: items, layouts, code snippets, identifiers, three-tier attributes |
//! | [`rep`] | Item reps, snapshot names and staged snapshot content, output paths |
//! | [`site`] | The loaded site: owns all entities for one run, builds and routes reps |
//! | [`rules`] | Patterns, compilation/routing/layout rules, first-match lookup, `rules.toml` |
//! | [`filters`] | The `Filter` trait, registry, per-call context and built-in filters |
//! | [`checksum`] | SHA-256 fingerprints and the persisted checksum store |
//! | [`outdatedness`] | Why a rep needs recompiling, checked in a fixed order |
//! | [`dependency`] | Item → item/layout dependency graph, persisted between runs |
//! | [`compiler`] | Single-rep compilation, the scheduler and full runs |
//! | [`data_source`] | Where entities come from: the filesystem or memory |
//! | [`config`] | `config.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting for compile events and reports |
//!
//! # Design Decisions
//!
//! ## Retry Instead of Dependency Ordering
//!
//! Dependencies between items are only discovered while filters run, so the
//! compiler cannot sort reps up front. A filter that needs an uncompiled rep
//! returns [`filters::FilterError::UnmetDependency`]; the scheduler moves that
//! rep to the front of the queue and retries. A run of failed attempts as long
//! as the queue means a cycle.
//!
//! ## Checksums, Not Timestamps
//!
//! Outdatedness compares SHA-256 fingerprints of content and attributes with
//! those stored by the previous run. Touching a file without changing it
//! triggers nothing, and restoring an old version from version control does.

pub mod checksum;
pub mod compiler;
pub mod config;
pub mod data_source;
pub mod dependency;
pub mod filters;
pub mod item;
pub mod outdatedness;
pub mod output;
pub mod rep;
pub mod rules;
pub mod site;

#[cfg(test)]
pub(crate) mod test_helpers;
