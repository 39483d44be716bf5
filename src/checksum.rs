//! Fingerprints and the checksum store for incremental builds.
//!
//! Every input that can change a rep's output gets a fingerprint:
//!
//! | Key | Input |
//! |-----|-------|
//! | `item:<identifier>` | item content and attributes |
//! | `layout:<identifier>` | layout content and attributes |
//! | `code:<name>` | one code snippet |
//! | `config` | the resolved site configuration |
//! | `rules` | the whole rule set |
//!
//! Fingerprints are SHA-256 over a type tag, the raw content and the
//! canonical JSON of the attributes. Attribute maps are ordered, so two runs
//! over semantically identical inputs always produce the same fingerprint.
//!
//! ## Storage
//!
//! The store is a JSON file at `<tmp_dir>/checksums.json`, written at the end
//! of every successful compile. A missing file, corrupt JSON or a version
//! mismatch loads as an empty store, which makes every rep outdated with
//! "not enough data" instead of failing the run.
//!
//! `kiln compile --force` loads an empty store on purpose.

use crate::item::{CodeSnippet, Item, Layout};
use crate::rules::RuleSet;
use crate::site::Site;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the checksum store within the tmp directory.
const STORE_FILENAME: &str = "checksums.json";

/// Version of the store format. Bump this to invalidate all existing stores
/// when the format or fingerprint computation changes.
const STORE_VERSION: u32 = 1;

/// A tracked input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChecksumKey {
    Item(String),
    Layout(String),
    CodeSnippet(String),
    Config,
    Rules,
}

impl ChecksumKey {
    /// Key used in the persisted store.
    pub fn store_key(&self) -> String {
        match self {
            Self::Item(id) => format!("item:{id}"),
            Self::Layout(id) => format!("layout:{id}"),
            Self::CodeSnippet(name) => format!("code:{name}"),
            Self::Config => "config".to_string(),
            Self::Rules => "rules".to_string(),
        }
    }
}

/// Fingerprints stored by the previous successful run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChecksumStore {
    pub version: u32,
    pub checksums: BTreeMap<String, String>,
}

impl ChecksumStore {
    /// Create an empty store (used for `--force` or the first build).
    pub fn empty() -> Self {
        Self {
            version: STORE_VERSION,
            checksums: BTreeMap::new(),
        }
    }

    /// Load from the tmp directory. Returns an empty store if the file
    /// doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(tmp_dir: &Path) -> Self {
        let path = store_path(tmp_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let store: Self = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "discarding unreadable checksum store");
                return Self::empty();
            }
        };
        if store.version != STORE_VERSION {
            debug!(found = store.version, expected = STORE_VERSION, "discarding checksum store");
            return Self::empty();
        }
        store
    }

    /// Save to the tmp directory, creating it if needed.
    pub fn save(&self, tmp_dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(tmp_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(store_path(tmp_dir), json)
    }

    pub fn get(&self, key: &ChecksumKey) -> Option<&str> {
        self.checksums.get(&key.store_key()).map(String::as_str)
    }

    pub fn insert(&mut self, key: &ChecksumKey, checksum: impl Into<String>) {
        self.checksums.insert(key.store_key(), checksum.into());
    }

    /// Names of all code snippets with a stored fingerprint.
    pub fn code_snippet_names(&self) -> impl Iterator<Item = &str> {
        self.checksums
            .keys()
            .filter_map(|k| k.strip_prefix("code:"))
    }

    /// A store holding exactly the given fingerprints.
    pub fn from_fingerprints(fingerprints: &Fingerprints) -> Self {
        let mut store = Self::empty();
        for (key, checksum) in fingerprints.entries() {
            store.insert(&key, checksum);
        }
        store
    }

    pub fn is_empty(&self) -> bool {
        self.checksums.is_empty()
    }
}

/// Resolve the checksum store path for a tmp directory.
pub fn store_path(tmp_dir: &Path) -> PathBuf {
    tmp_dir.join(STORE_FILENAME)
}

/// Fresh fingerprints of every tracked input of a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprints {
    items: BTreeMap<String, String>,
    layouts: BTreeMap<String, String>,
    code_snippets: BTreeMap<String, String>,
    config: String,
    rules: String,
}

impl Fingerprints {
    /// Fingerprint all items, layouts and snippets in parallel.
    pub fn compute(site: &Site, rules: &RuleSet) -> Result<Self, serde_json::Error> {
        let items = site
            .items()
            .par_iter()
            .map(|item| Ok((item.identifier.clone(), fingerprint_item(item)?)))
            .collect::<Result<BTreeMap<_, _>, serde_json::Error>>()?;
        let layouts = site
            .layouts()
            .par_iter()
            .map(|layout| Ok((layout.identifier.clone(), fingerprint_layout(layout)?)))
            .collect::<Result<BTreeMap<_, _>, serde_json::Error>>()?;
        let code_snippets = site
            .code_snippets()
            .par_iter()
            .map(|snippet| (snippet.name.clone(), fingerprint_code_snippet(snippet)))
            .collect();

        Ok(Self {
            items,
            layouts,
            code_snippets,
            config: fingerprint_serialized(b"config\0", site.config())?,
            rules: fingerprint_serialized(b"rules\0", rules)?,
        })
    }

    pub fn get(&self, key: &ChecksumKey) -> Option<&str> {
        match key {
            ChecksumKey::Item(id) => self.items.get(id).map(String::as_str),
            ChecksumKey::Layout(id) => self.layouts.get(id).map(String::as_str),
            ChecksumKey::CodeSnippet(name) => self.code_snippets.get(name).map(String::as_str),
            ChecksumKey::Config => Some(&self.config),
            ChecksumKey::Rules => Some(&self.rules),
        }
    }

    pub fn code_snippet_names(&self) -> impl Iterator<Item = &str> {
        self.code_snippets.keys().map(String::as_str)
    }

    /// Every fingerprint with its key.
    pub fn entries(&self) -> impl Iterator<Item = (ChecksumKey, &str)> {
        let items = self
            .items
            .iter()
            .map(|(id, c)| (ChecksumKey::Item(id.clone()), c.as_str()));
        let layouts = self
            .layouts
            .iter()
            .map(|(id, c)| (ChecksumKey::Layout(id.clone()), c.as_str()));
        let code = self
            .code_snippets
            .iter()
            .map(|(name, c)| (ChecksumKey::CodeSnippet(name.clone()), c.as_str()));
        items
            .chain(layouts)
            .chain(code)
            .chain([
                (ChecksumKey::Config, self.config.as_str()),
                (ChecksumKey::Rules, self.rules.as_str()),
            ])
    }
}

/// SHA-256 of an item's content and attributes.
pub fn fingerprint_item(item: &Item) -> Result<String, serde_json::Error> {
    let mut hasher = Sha256::new();
    hasher.update(b"item\0");
    hasher.update(item.content.as_bytes());
    hasher.update(b"\0");
    hasher.update(serde_json::to_vec(&item.attributes)?);
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of a layout's content and attributes.
pub fn fingerprint_layout(layout: &Layout) -> Result<String, serde_json::Error> {
    let mut hasher = Sha256::new();
    hasher.update(b"layout\0");
    hasher.update(layout.content.as_bytes());
    hasher.update(b"\0");
    hasher.update(serde_json::to_vec(&layout.attributes)?);
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of a code snippet's data.
pub fn fingerprint_code_snippet(snippet: &CodeSnippet) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"code\0");
    hasher.update(snippet.data.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn fingerprint_serialized<T: Serialize>(tag: &[u8], value: &T) -> Result<String, serde_json::Error> {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    hasher.update(serde_json::to_vec(value)?);
    Ok(format!("{:x}", hasher.finalize()))
}
