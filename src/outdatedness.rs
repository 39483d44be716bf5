//! Why a rep has to be recompiled.
//!
//! [`OutdatednessChecker::reason_for`] compares the stored fingerprints of the
//! previous run with fresh ones and returns the first reason that applies,
//! in this order:
//!
//! 1. [`NotWritten`](OutdatednessReason::NotWritten): an output file is missing
//! 2. [`NotEnoughData`](OutdatednessReason::NotEnoughData): a fingerprint was never stored
//! 3. [`SourceModified`](OutdatednessReason::SourceModified)
//! 4. [`CodeSnippetsModified`](OutdatednessReason::CodeSnippetsModified)
//! 5. [`ConfigurationModified`](OutdatednessReason::ConfigurationModified)
//! 6. [`RulesModified`](OutdatednessReason::RulesModified)
//!
//! Layout changes and changes in other items are not reasons on their own;
//! they reach a rep through the [`DependencyTracker`](crate::dependency::DependencyTracker).

use crate::checksum::{ChecksumKey, ChecksumStore, Fingerprints};
use crate::dependency::Entity;
use crate::item::ItemId;
use crate::rep::RepId;
use crate::site::Site;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutdatednessReason {
    NotWritten,
    NotEnoughData,
    SourceModified,
    CodeSnippetsModified,
    ConfigurationModified,
    RulesModified,
}

impl OutdatednessReason {
    pub fn message(self) -> &'static str {
        match self {
            Self::NotWritten => "output file does not exist",
            Self::NotEnoughData => "no checksums stored from a previous run",
            Self::SourceModified => "source was modified",
            Self::CodeSnippetsModified => "code snippets were modified",
            Self::ConfigurationModified => "site configuration was modified",
            Self::RulesModified => "rules were modified",
        }
    }
}

impl fmt::Display for OutdatednessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

pub struct OutdatednessChecker<'a> {
    site: &'a Site,
    stored: &'a ChecksumStore,
    current: &'a Fingerprints,
}

impl<'a> OutdatednessChecker<'a> {
    pub fn new(site: &'a Site, stored: &'a ChecksumStore, current: &'a Fingerprints) -> Self {
        Self {
            site,
            stored,
            current,
        }
    }

    /// First applicable reason for recompiling `rep`, or `None`.
    pub fn reason_for(&self, rep: RepId) -> Option<OutdatednessReason> {
        let item_rep = self.site.rep(rep);
        let item = self.site.item(item_rep.item());

        let written = self.site.skips_output(item_rep.item())
            || item_rep.outputs().values().all(|o| o.disk.exists());
        if !written {
            return Some(OutdatednessReason::NotWritten);
        }

        let item_key = ChecksumKey::Item(item.identifier.clone());
        let code_keys: Vec<ChecksumKey> = self
            .current
            .code_snippet_names()
            .map(|name| ChecksumKey::CodeSnippet(name.to_string()))
            .collect();

        let has_data = [&item_key, &ChecksumKey::Config, &ChecksumKey::Rules]
            .into_iter()
            .chain(&code_keys)
            .all(|key| self.stored.get(key).is_some());
        if !has_data {
            return Some(OutdatednessReason::NotEnoughData);
        }

        if self.changed(&item_key) {
            return Some(OutdatednessReason::SourceModified);
        }
        if self.code_snippets_changed(&code_keys) {
            return Some(OutdatednessReason::CodeSnippetsModified);
        }
        if self.changed(&ChecksumKey::Config) {
            return Some(OutdatednessReason::ConfigurationModified);
        }
        if self.changed(&ChecksumKey::Rules) {
            return Some(OutdatednessReason::RulesModified);
        }
        None
    }

    /// True if any rep of the item has a reason to be recompiled.
    pub fn is_item_outdated(&self, item: ItemId) -> bool {
        self.site
            .item(item)
            .reps()
            .iter()
            .any(|&rep| self.reason_for(rep).is_some())
    }

    /// True if the layout changed or was never fingerprinted.
    pub fn is_layout_outdated(&self, identifier: &str) -> bool {
        let key = ChecksumKey::Layout(identifier.to_string());
        self.stored.get(&key).is_none() || self.changed(&key)
    }

    /// Outdatedness of a dependency target. Entities that no longer exist
    /// count as outdated.
    pub fn is_entity_outdated(&self, entity: &Entity) -> bool {
        match entity {
            Entity::Item(identifier) => match self.site.find_item(identifier) {
                Some(item) => self.is_item_outdated(item),
                None => true,
            },
            Entity::Layout(identifier) => match self.site.find_layout(identifier) {
                Some(_) => self.is_layout_outdated(identifier),
                None => true,
            },
        }
    }

    fn changed(&self, key: &ChecksumKey) -> bool {
        self.stored.get(key) != self.current.get(key)
    }

    fn code_snippets_changed(&self, current_keys: &[ChecksumKey]) -> bool {
        let removed = self
            .stored
            .code_snippet_names()
            .any(|name| !current_keys.contains(&ChecksumKey::CodeSnippet(name.to_string())));
        removed || current_keys.iter().any(|key| self.changed(key))
    }
}
