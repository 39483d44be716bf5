//! The compiler: turns reps into content and writes them out.
//!
//! # Scheduling
//!
//! Reps are compiled one at a time from a FIFO queue. A filter may need the
//! final content of a rep that has not been compiled yet; instead of
//! failing, the attempt stops with [`RepOutcome::UnmetDependency`] and the
//! scheduler rearranges the queue:
//!
//! ```text
//! queue: [A, C]       A includes B, B not compiled
//! queue: [B, A, C]    B moves to the front, A right behind it
//! ```
//!
//! A counter of consecutive unmet dependencies is reset by every successful
//! compile. When it reaches the length of the queue, a full pass over the
//! pending work made no progress and the run fails with
//! [`CompileError::RecursiveCompilation`]. Any other error aborts the run at
//! once.
//!
//! # Incremental runs
//!
//! [`Compiler::run`] only compiles the reps of outdated items. An item is
//! outdated when one of its reps has an [`OutdatednessReason`] or when
//! anything it depends on (another item, a layout) is outdated. The edges of
//! an outdated item are forgotten before it is recompiled and recorded anew
//! while its filters run. Fresh fingerprints and the dependency graph are
//! stored at the end of a successful run.

use crate::checksum::{ChecksumStore, Fingerprints};
use crate::dependency::{DependencyTracker, Entity};
use crate::filters::{FilterContext, FilterError, FilterRegistry};
use crate::item::ItemId;
use crate::outdatedness::{OutdatednessChecker, OutdatednessReason};
use crate::rep::{RepId, Snapshots};
use crate::rules::{RuleSet, Step};
use crate::site::{Site, SiteError};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("No compilation rule matches {rep}")]
    NoCompilationRule { rep: String },
    #[error("Unknown filter `{filter}` while compiling {rep}")]
    UnknownFilter { rep: String, filter: String },
    #[error("Unknown layout {layout} while compiling {rep}")]
    UnknownLayout { rep: String, layout: String },
    #[error("No layout rule matches layout {layout} (compiling {rep})")]
    NoLayoutFilter { rep: String, layout: String },
    #[error("Filter `{filter}` failed while compiling {rep}: {source}")]
    Filter {
        rep: String,
        filter: String,
        source: FilterError,
    },
    #[error("Recursive compilation: dependency cycle between {}", .pending.join(", "))]
    RecursiveCompilation { pending: Vec<String> },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Site error: {0}")]
    Site(#[from] SiteError),
}

/// Result of one compile attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepOutcome {
    Compiled,
    /// The attempt stopped because this rep must be compiled first.
    UnmetDependency(RepId),
}

/// Progress events, for display.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileEvent {
    RepCompiled {
        rep: String,
        reason: Option<OutdatednessReason>,
        written: Vec<String>,
    },
    RepDeferred {
        rep: String,
        waiting_on: String,
    },
    RepSkipped {
        rep: String,
    },
}

/// Outcome of a [`Compiler::run`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CompileSummary {
    pub compiled: u32,
    pub skipped: u32,
    pub retries: u32,
    pub written: Vec<PathBuf>,
}

impl fmt::Display for CompileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} compiled, {} up to date, {} written",
            self.compiled,
            self.skipped,
            self.written.len()
        )?;
        match self.retries {
            0 => Ok(()),
            1 => write!(f, " (1 retry)"),
            n => write!(f, " ({n} retries)"),
        }
    }
}

/// Why one rep would be recompiled, for `kiln check`.
#[derive(Debug, Clone, PartialEq)]
pub struct RepStatus {
    pub rep: String,
    pub reason: Option<OutdatednessReason>,
    pub outdated_by_dependency: bool,
}

impl RepStatus {
    pub fn is_outdated(&self) -> bool {
        self.reason.is_some() || self.outdated_by_dependency
    }
}

pub struct Compiler<'a> {
    site: Site,
    rules: &'a RuleSet,
    filters: &'a FilterRegistry,
    dependencies: DependencyTracker,
    events: Option<Sender<CompileEvent>>,
    reasons: HashMap<RepId, OutdatednessReason>,
    summary: CompileSummary,
}

impl<'a> Compiler<'a> {
    /// A compiler for a prepared site (reps built and routed).
    pub fn new(site: Site, rules: &'a RuleSet, filters: &'a FilterRegistry) -> Self {
        Self {
            site,
            rules,
            filters,
            dependencies: DependencyTracker::new(),
            events: None,
            reasons: HashMap::new(),
            summary: CompileSummary::default(),
        }
    }

    pub fn with_events(mut self, events: Sender<CompileEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn into_site(self) -> Site {
        self.site
    }

    pub fn dependencies(&self) -> &DependencyTracker {
        &self.dependencies
    }

    pub fn summary(&self) -> &CompileSummary {
        &self.summary
    }

    fn emit(&self, event: CompileEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    // ========================================================================
    // Single rep
    // ========================================================================

    /// Run the compilation rule of one rep.
    ///
    /// Compiling an already compiled rep does nothing. On success the rep is
    /// marked compiled, its outputs are written and what its filters read is
    /// recorded as dependencies.
    pub fn compile_rep(&mut self, rep: RepId) -> Result<RepOutcome, CompileError> {
        if self.site.rep(rep).is_compiled() {
            return Ok(RepOutcome::Compiled);
        }
        let rules = self.rules;
        let filters = self.filters;
        let label = self.site.rep_label(rep);
        let item = self.site.item(self.site.rep(rep).item());
        let identifier = item.identifier.clone();

        let rule = rules
            .compilation_rule_for(&identifier, self.site.rep(rep).name())
            .ok_or_else(|| CompileError::NoCompilationRule { rep: label.clone() })?;

        let mut snapshots = Snapshots::start(item.content.clone());
        let mut reads = BTreeSet::new();

        for step in &rule.steps {
            let (filter_name, result) = match step {
                Step::Filter { name, params } => {
                    let filter = filters.get(name).ok_or_else(|| CompileError::UnknownFilter {
                        rep: label.clone(),
                        filter: name.clone(),
                    })?;
                    let ctx = FilterContext::new(&self.site, rep);
                    let result = filter.run(snapshots.last(), &ctx, params);
                    reads.extend(ctx.into_reads());
                    (name.as_str(), result)
                }
                Step::Layout { identifier } => {
                    let layout = self.site.find_layout(identifier).ok_or_else(|| {
                        CompileError::UnknownLayout {
                            rep: label.clone(),
                            layout: identifier.clone(),
                        }
                    })?;
                    let (name, params) = rules.filter_for_layout(&layout.identifier).ok_or_else(
                        || CompileError::NoLayoutFilter {
                            rep: label.clone(),
                            layout: layout.identifier.clone(),
                        },
                    )?;
                    let filter = filters.get(name).ok_or_else(|| CompileError::UnknownFilter {
                        rep: label.clone(),
                        filter: name.to_string(),
                    })?;

                    snapshots.freeze_pre();
                    reads.insert(Entity::Layout(layout.identifier.clone()));
                    let laid_out = snapshots.last().to_string();
                    let ctx = FilterContext::for_layout(&self.site, rep, layout, &laid_out);
                    let result = filter.run(&layout.content, &ctx, params);
                    reads.extend(ctx.into_reads());
                    (name, result)
                }
            };

            match result {
                Ok(content) => snapshots.set_last(content),
                Err(FilterError::UnmetDependency(dep)) => {
                    return Ok(RepOutcome::UnmetDependency(dep));
                }
                Err(source) => {
                    return Err(CompileError::Filter {
                        rep: label,
                        filter: filter_name.to_string(),
                        source,
                    });
                }
            }
        }
        snapshots.finish();

        let from = Entity::Item(identifier);
        for on in reads {
            self.dependencies.record_dependency(from.clone(), on);
        }

        let written = self.write_outputs(rep, &snapshots)?;
        self.site.rep_mut(rep).complete(snapshots);
        self.summary.compiled += 1;
        debug!(rep = %label, written = written.len(), "compiled");

        self.emit(CompileEvent::RepCompiled {
            rep: label,
            reason: self.reasons.get(&rep).copied(),
            written: written.iter().map(|(web, _)| web.clone()).collect(),
        });
        self.summary
            .written
            .extend(written.into_iter().map(|(_, disk)| disk));
        Ok(RepOutcome::Compiled)
    }

    /// Write every routed snapshot. Returns `(web path, disk path)` pairs.
    fn write_outputs(
        &self,
        rep: RepId,
        snapshots: &Snapshots,
    ) -> Result<Vec<(String, PathBuf)>, CompileError> {
        let item_rep = self.site.rep(rep);
        if self.site.skips_output(item_rep.item()) {
            return Ok(Vec::new());
        }
        let mut written = Vec::new();
        for (&snapshot, output) in item_rep.outputs() {
            let Some(content) = snapshots.get(snapshot) else {
                continue;
            };
            let write = |path: &PathBuf| -> std::io::Result<()> {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, content)
            };
            write(&output.disk).map_err(|source| CompileError::Write {
                path: output.disk.clone(),
                source,
            })?;
            written.push((output.web.clone(), output.disk.clone()));
        }
        Ok(written)
    }

    // ========================================================================
    // Scheduler
    // ========================================================================

    /// Compile a batch of reps, retrying those that wait on other reps.
    pub fn compile_reps(&mut self, reps: impl IntoIterator<Item = RepId>) -> Result<(), CompileError> {
        let mut queue: VecDeque<RepId> = reps.into_iter().collect();
        let mut failures = 0usize;

        while let Some(rep) = queue.pop_front() {
            match self.compile_rep(rep)? {
                RepOutcome::Compiled => failures = 0,
                RepOutcome::UnmetDependency(dep) => {
                    if dep == rep {
                        return Err(CompileError::RecursiveCompilation {
                            pending: vec![self.site.rep_label(rep)],
                        });
                    }
                    queue.retain(|&r| r != dep);
                    queue.push_front(rep);
                    queue.push_front(dep);
                    failures += 1;
                    self.summary.retries += 1;

                    let rep_label = self.site.rep_label(rep);
                    let dep_label = self.site.rep_label(dep);
                    debug!(rep = %rep_label, waiting_on = %dep_label, failures, "requeued");
                    self.emit(CompileEvent::RepDeferred {
                        rep: rep_label,
                        waiting_on: dep_label,
                    });

                    if failures >= queue.len() {
                        let pending: Vec<String> =
                            queue.iter().map(|&r| self.site.rep_label(r)).collect();
                        warn!(pending = ?pending, "dependency cycle detected");
                        return Err(CompileError::RecursiveCompilation { pending });
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Full run
    // ========================================================================

    /// Compile everything that is outdated and store the new state.
    ///
    /// With `force`, stored checksums and dependencies are ignored and
    /// every rep is compiled.
    pub fn run(&mut self, force: bool) -> Result<CompileSummary, CompileError> {
        let tmp_dir = self.site.tmp_dir();
        let stored = if force {
            ChecksumStore::empty()
        } else {
            ChecksumStore::load(&tmp_dir)
        };
        self.dependencies = if force {
            DependencyTracker::new()
        } else {
            DependencyTracker::load(&tmp_dir)
        };
        let site = &self.site;
        self.dependencies.retain_sources(|from| match from {
            Entity::Item(identifier) => site.find_item(identifier).is_some(),
            Entity::Layout(_) => true,
        });
        let fresh = Fingerprints::compute(&self.site, self.rules)?;

        let outdated = {
            let checker = OutdatednessChecker::new(&self.site, &stored, &fresh);
            for rep in self.site.rep_ids() {
                if let Some(reason) = checker.reason_for(rep) {
                    self.reasons.insert(rep, reason);
                }
            }
            outdated_items(&self.site, &self.dependencies, &checker)
        };

        let mut scheduled = Vec::new();
        for &item in &outdated {
            let identifier = self.site.item(item).identifier.clone();
            self.dependencies
                .forget_dependencies_for(&Entity::Item(identifier));
            scheduled.extend_from_slice(self.site.item(item).reps());
        }
        info!(
            outdated_items = outdated.len(),
            reps = scheduled.len(),
            total = self.site.reps().len(),
            "compiling"
        );

        self.compile_reps(scheduled)?;

        // Reps pulled in by an include are compiled even when not scheduled.
        for rep in self.site.rep_ids() {
            if !self.site.rep(rep).is_compiled() {
                self.emit(CompileEvent::RepSkipped {
                    rep: self.site.rep_label(rep),
                });
            }
        }

        ChecksumStore::from_fingerprints(&fresh).save(&tmp_dir)?;
        self.dependencies.save(&tmp_dir)?;

        let untouched = self
            .site
            .reps()
            .iter()
            .filter(|r| !r.is_compiled())
            .count();
        self.summary.skipped = untouched as u32;
        Ok(self.summary.clone())
    }

    /// Every rep with the reason it would be recompiled, without compiling.
    pub fn outdatedness_report(&self) -> Result<Vec<RepStatus>, CompileError> {
        let tmp_dir = self.site.tmp_dir();
        let stored = ChecksumStore::load(&tmp_dir);
        let dependencies = DependencyTracker::load(&tmp_dir);
        let fresh = Fingerprints::compute(&self.site, self.rules)?;
        let checker = OutdatednessChecker::new(&self.site, &stored, &fresh);
        let by_dependency = outdated_items(&self.site, &dependencies, &checker);

        Ok(self
            .site
            .rep_ids()
            .map(|rep| {
                let reason = checker.reason_for(rep);
                let item = self.site.rep(rep).item();
                RepStatus {
                    rep: self.site.rep_label(rep),
                    reason,
                    outdated_by_dependency: reason.is_none() && by_dependency.contains(&item),
                }
            })
            .collect())
    }
}

/// Items with an outdated rep or an outdated dependency, in site order.
fn outdated_items(
    site: &Site,
    dependencies: &DependencyTracker,
    checker: &OutdatednessChecker<'_>,
) -> Vec<ItemId> {
    (0..site.items().len())
        .map(ItemId)
        .filter(|&item| {
            checker.is_item_outdated(item)
                || dependencies.outdated_due_to_dependencies(
                    &Entity::Item(site.item(item).identifier.clone()),
                    |entity| checker.is_entity_outdated(entity),
                )
        })
        .collect()
}
