//! Where items, layouts, code snippets and configuration come from.
//!
//! The compiler never touches the backing store itself. A [`DataSource`]
//! hands over fully built entities, bracketed by `use_source` and
//! `unuse_source` so a source can open and release whatever it needs.
//!
//! ## Filesystem layout
//!
//! ```text
//! site/
//! ├── config.toml
//! ├── rules.toml
//! ├── content/
//! │   ├── index.md            → /
//! │   ├── about.md            → /about/
//! │   └── blog/
//! │       ├── index.html      → /blog/
//! │       └── first-post.md   → /blog/first-post/
//! ├── layouts/
//! │   └── default.html        → /default/
//! └── lib/
//!     └── helpers.txt         → code snippet "helpers.txt"
//! ```
//!
//! Content files may start with TOML front matter:
//!
//! ```text
//! +++
//! title = "First post"
//! tags = ["rust"]
//! +++
//! Body goes here.
//! ```
//!
//! The file extension is kept as the `source_extension` attribute. Hidden
//! files and editor backups (`name~`) are ignored.

use crate::config::{ConfigError, SiteConfig, load_config};
use crate::item::{Attributes, CodeSnippet, Item, Layout};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid front matter in {path}: {source}")]
    FrontMatter {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Unterminated front matter in {0}")]
    UnterminatedFrontMatter(PathBuf),
    #[error("Data source used before use_source")]
    NotInUse,
    #[error("{0}")]
    Other(String),
}

/// A backing store for site entities.
pub trait DataSource {
    /// Prepare the source for loading.
    fn use_source(&mut self) -> Result<(), DataSourceError> {
        Ok(())
    }

    /// Release whatever `use_source` acquired.
    fn unuse_source(&mut self) {}

    fn configuration(&self) -> Result<SiteConfig, DataSourceError>;
    fn items(&self) -> Result<Vec<Item>, DataSourceError>;
    fn layouts(&self) -> Result<Vec<Layout>, DataSourceError>;
    fn code_snippets(&self) -> Result<Vec<CodeSnippet>, DataSourceError>;
}

// ============================================================================
// Filesystem
// ============================================================================

/// Reads a site directory. `use_source` loads `config.toml`, which decides
/// where the content, layouts and lib directories are.
#[derive(Debug)]
pub struct FilesystemDataSource {
    root: PathBuf,
    config: Option<SiteConfig>,
}

impl FilesystemDataSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: None,
        }
    }

    fn config(&self) -> Result<&SiteConfig, DataSourceError> {
        self.config.as_ref().ok_or(DataSourceError::NotInUse)
    }

    fn dir(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

impl DataSource for FilesystemDataSource {
    fn use_source(&mut self) -> Result<(), DataSourceError> {
        self.config = Some(load_config(&self.root)?);
        Ok(())
    }

    fn unuse_source(&mut self) {
        self.config = None;
    }

    fn configuration(&self) -> Result<SiteConfig, DataSourceError> {
        Ok(self.config()?.clone())
    }

    fn items(&self) -> Result<Vec<Item>, DataSourceError> {
        let dir = self.dir(&self.config()?.content_dir);
        source_files(&dir)?
            .into_iter()
            .map(|path| {
                let (attributes, content) = read_with_front_matter(&path)?;
                Ok(Item::new(content, attributes, identifier_for(&dir, &path)))
            })
            .collect()
    }

    fn layouts(&self) -> Result<Vec<Layout>, DataSourceError> {
        let dir = self.dir(&self.config()?.layouts_dir);
        source_files(&dir)?
            .into_iter()
            .map(|path| {
                let (attributes, content) = read_with_front_matter(&path)?;
                Ok(Layout::new(content, attributes, identifier_for(&dir, &path)))
            })
            .collect()
    }

    fn code_snippets(&self) -> Result<Vec<CodeSnippet>, DataSourceError> {
        let dir = self.dir(&self.config()?.lib_dir);
        source_files(&dir)?
            .into_iter()
            .map(|path| {
                let data = std::fs::read_to_string(&path)?;
                let name = relative_name(&dir, &path);
                Ok(CodeSnippet::new(data, name))
            })
            .collect()
    }
}

/// Files under `dir`, sorted, skipping hidden files and editor backups.
/// A missing directory has no files.
fn source_files(dir: &Path) -> Result<Vec<PathBuf>, DataSourceError> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "directory missing, nothing to load");
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_str().unwrap_or_default();
        if name.is_empty() || name.starts_with('.') || name.ends_with('~') {
            continue;
        }
        files.push(entry.into_path());
    }
    Ok(files)
}

/// `content/blog/first.md` → `/blog/first/`, `content/blog/index.md` → `/blog/`.
fn identifier_for(dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(dir).unwrap_or(path);
    let mut segments: Vec<String> = relative
        .parent()
        .into_iter()
        .flat_map(|p| p.components())
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem != "index" {
        segments.push(stem);
    }
    crate::item::clean_identifier(&segments.join("/"))
}

fn relative_name(dir: &Path, path: &Path) -> String {
    path.strip_prefix(dir)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_with_front_matter(path: &Path) -> Result<(Attributes, String), DataSourceError> {
    let raw = std::fs::read_to_string(path)?;
    let (mut attributes, content) = split_front_matter(&raw, path)?;
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        attributes
            .entry("source_extension".to_string())
            .or_insert_with(|| Value::String(ext.to_string()));
    }
    Ok((attributes, content))
}

/// Split `+++`-fenced TOML front matter from the body.
pub fn split_front_matter(raw: &str, path: &Path) -> Result<(Attributes, String), DataSourceError> {
    let Some(rest) = raw
        .strip_prefix("+++\n")
        .or_else(|| raw.strip_prefix("+++\r\n"))
    else {
        return Ok((Attributes::new(), raw.to_string()));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "+++" {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let attributes: Attributes =
                toml::from_str(front).map_err(|source| DataSourceError::FrontMatter {
                    path: path.to_path_buf(),
                    source,
                })?;
            return Ok((attributes, body.to_string()));
        }
        offset += line.len();
    }
    Err(DataSourceError::UnterminatedFrontMatter(path.to_path_buf()))
}

// ============================================================================
// In-memory
// ============================================================================

/// Pre-built entities, for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    config: SiteConfig,
    items: Vec<Item>,
    layouts: Vec<Layout>,
    code_snippets: Vec<CodeSnippet>,
    in_use: bool,
}

impl MemoryDataSource {
    pub fn new(config: SiteConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layouts.push(layout);
        self
    }

    pub fn with_code_snippet(mut self, snippet: CodeSnippet) -> Self {
        self.code_snippets.push(snippet);
        self
    }

    fn check_in_use(&self) -> Result<(), DataSourceError> {
        if self.in_use {
            Ok(())
        } else {
            Err(DataSourceError::NotInUse)
        }
    }
}

impl DataSource for MemoryDataSource {
    fn use_source(&mut self) -> Result<(), DataSourceError> {
        self.in_use = true;
        Ok(())
    }

    fn unuse_source(&mut self) {
        self.in_use = false;
    }

    fn configuration(&self) -> Result<SiteConfig, DataSourceError> {
        self.check_in_use()?;
        Ok(self.config.clone())
    }

    fn items(&self) -> Result<Vec<Item>, DataSourceError> {
        self.check_in_use()?;
        Ok(self.items.clone())
    }

    fn layouts(&self) -> Result<Vec<Layout>, DataSourceError> {
        self.check_in_use()?;
        Ok(self.layouts.clone())
    }

    fn code_snippets(&self) -> Result<Vec<CodeSnippet>, DataSourceError> {
        self.check_in_use()?;
        Ok(self.code_snippets.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn loaded(root: &Path) -> FilesystemDataSource {
        let mut source = FilesystemDataSource::new(root);
        source.use_source().unwrap();
        source
    }

    // =========================================================================
    // Identifiers
    // =========================================================================

    #[test]
    fn identifiers_from_paths() {
        let dir = Path::new("/site/content");
        assert_eq!(identifier_for(dir, &dir.join("about.md")), "/about/");
        assert_eq!(identifier_for(dir, &dir.join("blog/first.md")), "/blog/first/");
        assert_eq!(identifier_for(dir, &dir.join("blog/index.html")), "/blog/");
        assert_eq!(identifier_for(dir, &dir.join("index.md")), "/");
        assert_eq!(identifier_for(dir, &dir.join("style.min.css")), "/style.min/");
    }

    // =========================================================================
    // Front matter
    // =========================================================================

    #[test]
    fn front_matter_becomes_attributes() {
        let (attrs, body) = split_front_matter(
            "+++\ntitle = \"Hi\"\ntags = [\"a\"]\n+++\nBody\n",
            Path::new("x.md"),
        )
        .unwrap();
        assert_eq!(attrs["title"], json!("Hi"));
        assert_eq!(attrs["tags"], json!(["a"]));
        assert_eq!(body, "Body\n");
    }

    #[test]
    fn no_front_matter_keeps_everything() {
        let (attrs, body) = split_front_matter("just text\n+++\n", Path::new("x.md")).unwrap();
        assert!(attrs.is_empty());
        assert_eq!(body, "just text\n+++\n");
    }

    #[test]
    fn unterminated_front_matter_is_error() {
        let err = split_front_matter("+++\ntitle = 1\n", Path::new("x.md")).unwrap_err();
        assert!(matches!(err, DataSourceError::UnterminatedFrontMatter(_)));
    }

    #[test]
    fn invalid_front_matter_is_error() {
        let err = split_front_matter("+++\ntitle = \n+++\n", Path::new("x.md")).unwrap_err();
        assert!(matches!(err, DataSourceError::FrontMatter { .. }));
    }

    // =========================================================================
    // FilesystemDataSource
    // =========================================================================

    #[test]
    fn loads_items_layouts_and_snippets() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "content/index.md", "+++\ntitle = \"Home\"\n+++\nWelcome");
        write(tmp.path(), "content/blog/first.md", "First");
        write(tmp.path(), "content/blog/first.md~", "backup");
        write(tmp.path(), "content/.hidden", "nope");
        write(tmp.path(), "layouts/default.html", "<html>{{ yield }}</html>");
        write(tmp.path(), "lib/helpers/date.txt", "helper");

        let source = loaded(tmp.path());
        let items = source.items().unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.identifier.as_str()).collect();
        assert_eq!(ids, vec!["/blog/first/", "/"]);

        let home = &items[1];
        assert_eq!(home.content, "Welcome");
        assert_eq!(home.attributes["title"], json!("Home"));
        assert_eq!(home.attributes["source_extension"], json!("md"));

        let layouts = source.layouts().unwrap();
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].identifier, "/default/");

        let snippets = source.code_snippets().unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].name, "helpers/date.txt");
        assert_eq!(snippets[0].data, "helper");
    }

    #[test]
    fn missing_directories_are_empty() {
        let tmp = TempDir::new().unwrap();
        let source = loaded(tmp.path());
        assert!(source.items().unwrap().is_empty());
        assert!(source.layouts().unwrap().is_empty());
        assert!(source.code_snippets().unwrap().is_empty());
    }

    #[test]
    fn directories_follow_config() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "config.toml", "content_dir = \"pages\"\n");
        write(tmp.path(), "pages/a.md", "A");
        write(tmp.path(), "content/b.md", "B");

        let source = loaded(tmp.path());
        let items = source.items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].identifier, "/a/");
        assert_eq!(source.configuration().unwrap().content_dir, "pages");
    }

    #[test]
    fn loading_before_use_is_error() {
        let tmp = TempDir::new().unwrap();
        let source = FilesystemDataSource::new(tmp.path());
        assert!(matches!(source.items(), Err(DataSourceError::NotInUse)));
    }

    #[test]
    fn bad_config_fails_use_source() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "config.toml", "output_dir = \"\"\n");
        let mut source = FilesystemDataSource::new(tmp.path());
        assert!(matches!(source.use_source(), Err(DataSourceError::Config(_))));
    }

    // =========================================================================
    // MemoryDataSource
    // =========================================================================

    #[test]
    fn memory_source_loads_only_while_in_use() {
        let mut source = MemoryDataSource::new(SiteConfig::default())
            .with_item(Item::new("A", Attributes::new(), "/a/"));
        assert!(source.items().is_err());

        source.use_source().unwrap();
        assert_eq!(source.items().unwrap().len(), 1);
        source.unuse_source();

        assert!(source.layouts().is_err());
    }
}
