//! Site configuration module.
//!
//! Handles loading, validating, and merging the site's `config.toml`. The
//! stock defaults are serialized to a TOML table and the user file is merged
//! on top, so a config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! output_dir = "output"      # Compiled reps are written here
//! content_dir = "content"    # Items
//! layouts_dir = "layouts"    # Layouts
//! lib_dir = "lib"            # Code snippets (tracked, never executed)
//! rules_file = "rules.toml"  # Compilation, routing and layout rules
//! tmp_dir = "tmp"            # Checksum and dependency stores
//!
//! [item_defaults]            # Second tier of attribute lookup
//! extension = "html"
//!
//! [site]                     # Free-form settings, visible to filters as site.<key>
//! title = "My Site"
//! ```
//!
//! Unknown top-level keys are rejected to catch typos early. The resolved
//! configuration is part of every rep's inputs: changing any value makes all
//! reps outdated on the next run.

use crate::item::Attributes;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the configuration file in the site root.
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Directory compiled reps are written to, relative to the site root.
    pub output_dir: String,
    /// Directory holding item sources.
    pub content_dir: String,
    /// Directory holding layouts.
    pub layouts_dir: String,
    /// Directory holding auxiliary code snippets.
    pub lib_dir: String,
    /// Rule definitions file.
    pub rules_file: String,
    /// Directory for the checksum and dependency stores.
    pub tmp_dir: String,
    /// Site-wide attribute defaults for items.
    pub item_defaults: Attributes,
    /// Free-form settings exposed to filters.
    pub site: Attributes,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            output_dir: "output".to_string(),
            content_dir: "content".to_string(),
            layouts_dir: "layouts".to_string(),
            lib_dir: "lib".to_string(),
            rules_file: "rules.toml".to_string(),
            tmp_dir: "tmp".to_string(),
            item_defaults: Attributes::new(),
            site: Attributes::new(),
        }
    }
}

impl SiteConfig {
    /// Validate that the directory settings can work together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "output_dir must not be empty".into(),
            ));
        }
        if self.tmp_dir.trim().is_empty() {
            return Err(ConfigError::Validation("tmp_dir must not be empty".into()));
        }
        if self.rules_file.trim().is_empty() {
            return Err(ConfigError::Validation(
                "rules_file must not be empty".into(),
            ));
        }
        if normalize_dir(&self.output_dir) == normalize_dir(&self.content_dir) {
            return Err(ConfigError::Validation(
                "output_dir must differ from content_dir".into(),
            ));
        }
        Ok(())
    }
}

fn normalize_dir(dir: &str) -> &str {
    dir.trim().trim_start_matches("./").trim_end_matches('/')
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the directory has no `config.toml`.
pub fn load_raw_config(root: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = root.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the site configuration from `root/config.toml`.
///
/// A missing file yields the stock defaults.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# kiln configuration
# ==================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.
#
# Every value here is fingerprinted: changing anything in this file makes
# every rep outdated on the next compile.

# Compiled output is written here (relative to the site root).
output_dir = "output"

# Item sources. Each file becomes one item; `index.*` files take the
# identifier of their directory. Optional TOML front matter between `+++`
# fences becomes the item's attributes.
content_dir = "content"

# Layouts, identified like items (layouts/default.html -> /default/).
layouts_dir = "layouts"

# Auxiliary code. Never executed; tracked so that edits trigger a rebuild.
lib_dir = "lib"

# Compilation, routing and layout rules.
rules_file = "rules.toml"

# Checksum and dependency stores used for incremental compilation.
tmp_dir = "tmp"

# ---------------------------------------------------------------------------
# Item defaults
# ---------------------------------------------------------------------------
# Attributes every item inherits unless it sets them itself.
# Built-in fallbacks: extension = "html", filename = "index",
# is_draft = false, skip_output = false.
[item_defaults]
# extension = "html"

# ---------------------------------------------------------------------------
# Site settings
# ---------------------------------------------------------------------------
# Free-form values available to the template filter as {{ site.<key> }}.
[site]
# title = "My Site"
"##
}
