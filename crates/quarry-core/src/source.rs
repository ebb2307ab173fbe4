//! Document sources.
//!
//! A `DocumentSource` turns vault paths into [`IndexedDocument`]s. The core
//! never touches the filesystem directly; hosts plug in a source:
//!
//! - [`FsDocumentSource`] reads a vault directory
//! - [`MemoryDocumentSource`] holds documents in memory (embedding hosts, tests)
//!
//! Source failures are host-side concerns and are reported with `anyhow`.

use crate::config::Config;
use crate::error::QuarryError;
use crate::types::IndexedDocument;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// The kind of change reported for a vault path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,

    /// The path was moved; `old_path` is where it used to be
    Renamed { old_path: String },
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Renamed { .. } => write!(f, "renamed"),
        }
    }
}

/// Produces documents for the index.
pub trait DocumentSource: Send + Sync {
    /// Build the indexable document for a vault path.
    fn read_document(&self, path: &str) -> Result<IndexedDocument>;

    /// Read the raw text of a path, for line matching.
    fn read_content(&self, path: &str) -> Result<String>;

    /// List every path that should be indexed.
    fn enumerate_documents(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AliasField {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default)]
    aliases: Option<AliasField>,
    #[serde(default)]
    alias: Option<AliasField>,
}

/// Extract `aliases` (or `alias`) from a leading YAML front-matter block.
///
/// Returns the aliases joined by spaces.
pub fn front_matter_aliases(content: &str) -> Option<String> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;
    let end = rest
        .match_indices("\n---")
        .map(|(idx, _)| idx)
        .find(|idx| {
            let after = &rest[idx + 4..];
            after.is_empty() || after.starts_with('\n') || after.starts_with("\r\n")
        })?;
    let block = &rest[..end];

    let front: FrontMatter = match serde_norway::from_str(block) {
        Ok(front) => front,
        Err(e) => {
            debug!(error = %e, "Ignoring unparsable front matter");
            return None;
        }
    };

    let names: Vec<String> = [front.aliases, front.alias]
        .into_iter()
        .flatten()
        .flat_map(|field| match field {
            AliasField::One(name) => vec![name],
            AliasField::Many(names) => names,
        })
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    if names.is_empty() {
        None
    } else {
        Some(names.join(" "))
    }
}

/// Reads documents from a vault directory.
///
/// Files whose extension is not a content extension are indexed by name
/// and folder only.
pub struct FsDocumentSource {
    root: PathBuf,
    config: Arc<Config>,
}

impl FsDocumentSource {
    pub fn new(root: impl AsRef<Path>, config: Arc<Config>) -> Self {
        FsDocumentSource {
            root: root.as_ref().to_path_buf(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a vault-relative path.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// Vault-relative `/`-separated path, if `path` lies inside the vault.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

impl DocumentSource for FsDocumentSource {
    fn read_document(&self, path: &str) -> Result<IndexedDocument> {
        let full = self.resolve(path);
        if !full.is_file() {
            return Err(QuarryError::DocumentNotFound {
                path: path.to_string(),
            }
            .into());
        }

        if !self.config.is_content_indexable(path) {
            let reason = QuarryError::UnsupportedContent { path: full };
            debug!(reason = %reason, "Indexing metadata only");
            return Ok(IndexedDocument::new(path, None));
        }

        let content = self.read_content(path)?;
        let aliases = front_matter_aliases(&content);
        let mut doc = IndexedDocument::new(path, Some(content));
        if let Some(aliases) = aliases {
            doc = doc.with_aliases(aliases);
        }
        Ok(doc)
    }

    fn read_content(&self, path: &str) -> Result<String> {
        let full = self.resolve(path);
        let bytes = fs::read(&full).with_context(|| format!("reading {}", full.display()))?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(path = %path, "File is not valid UTF-8, decoding lossily");
                Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        }
    }

    fn enumerate_documents(&self) -> Result<Vec<String>> {
        let excludes = self.config.exclude_patterns();
        let mut paths = Vec::new();

        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable vault entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = self.relative(entry.path()) else {
                continue;
            };
            if excludes.iter().any(|p| p.matches(&rel)) {
                continue;
            }
            paths.push(rel);
        }

        paths.sort();
        debug!(root = %self.root.display(), documents = paths.len(), "Enumerated vault");
        Ok(paths)
    }
}

/// Holds documents in memory, keyed by path.
#[derive(Default)]
pub struct MemoryDocumentSource {
    files: RwLock<BTreeMap<String, String>>,
}

impl MemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file.
    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files.write().insert(path.into(), content.into());
    }

    pub fn remove(&self, path: &str) -> Option<String> {
        self.files.write().remove(path)
    }
}

impl DocumentSource for MemoryDocumentSource {
    fn read_document(&self, path: &str) -> Result<IndexedDocument> {
        let content = self.read_content(path)?;
        let aliases = front_matter_aliases(&content);
        let mut doc = IndexedDocument::new(path, Some(content));
        if let Some(aliases) = aliases {
            doc = doc.with_aliases(aliases);
        }
        Ok(doc)
    }

    fn read_content(&self, path: &str) -> Result<String> {
        self.files.read().get(path).cloned().ok_or_else(|| {
            QuarryError::DocumentNotFound {
                path: path.to_string(),
            }
            .into()
        })
    }

    fn enumerate_documents(&self) -> Result<Vec<String>> {
        Ok(self.files.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vault() -> (TempDir, FsDocumentSource) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("notes/daily")).unwrap();
        fs::create_dir_all(root.join(".obsidian")).unwrap();
        fs::write(root.join("notes/daily/today.md"), "hello world").unwrap();
        fs::write(
            root.join("notes/jdoe.md"),
            "---\naliases: [Jane Doe, JD]\n---\ncontact card",
        )
        .unwrap();
        fs::write(root.join("scan.pdf"), b"\xff\xfe\x00").unwrap();
        fs::write(root.join(".obsidian/app.json"), "{}").unwrap();

        let source = FsDocumentSource::new(root, Arc::new(Config::default()));
        (dir, source)
    }

    #[test]
    fn test_enumerate_respects_excludes() {
        let (_dir, source) = vault();
        let paths = source.enumerate_documents().unwrap();
        assert_eq!(
            paths,
            vec!["notes/daily/today.md", "notes/jdoe.md", "scan.pdf"]
        );
    }

    #[test]
    fn test_read_document() {
        let (_dir, source) = vault();
        let doc = source.read_document("notes/daily/today.md").unwrap();
        assert_eq!(doc.basename, "today");
        assert_eq!(doc.folder, "notes/daily");
        assert_eq!(doc.content.as_deref(), Some("hello world"));
        assert!(doc.aliases.is_none());
    }

    #[test]
    fn test_front_matter_aliases_from_file() {
        let (_dir, source) = vault();
        let doc = source.read_document("notes/jdoe.md").unwrap();
        assert_eq!(doc.aliases.as_deref(), Some("Jane Doe JD"));
    }

    #[test]
    fn test_binary_file_is_metadata_only() {
        let (_dir, source) = vault();
        let doc = source.read_document("scan.pdf").unwrap();
        assert_eq!(doc.basename, "scan");
        assert!(doc.content.is_none());
    }

    #[test]
    fn test_missing_document() {
        let (_dir, source) = vault();
        let err = source.read_document("gone.md").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QuarryError>(),
            Some(QuarryError::DocumentNotFound { .. })
        ));
    }

    #[test]
    fn test_relative_path() {
        let (dir, source) = vault();
        assert_eq!(
            source.relative(&dir.path().join("notes").join("a.md")).as_deref(),
            Some("notes/a.md")
        );
        assert!(source.relative(Path::new("/elsewhere/a.md")).is_none());
    }

    #[test]
    fn test_front_matter_variants() {
        assert_eq!(
            front_matter_aliases("---\nalias: Solo\n---\nbody").as_deref(),
            Some("Solo")
        );
        assert_eq!(
            front_matter_aliases("---\naliases:\n  - One\n  - Two\n---\n").as_deref(),
            Some("One Two")
        );
        assert!(front_matter_aliases("no front matter").is_none());
        assert!(front_matter_aliases("---\ntitle: x\n---\n").is_none());
        assert!(front_matter_aliases("---\naliases: [unclosed\n").is_none());
    }

    #[test]
    fn test_memory_source() {
        let source = MemoryDocumentSource::new();
        source.insert("b.md", "beta");
        source.insert("a.md", "alpha");
        assert_eq!(source.enumerate_documents().unwrap(), vec!["a.md", "b.md"]);
        assert_eq!(source.read_content("a.md").unwrap(), "alpha");

        source.remove("a.md");
        assert!(source.read_document("a.md").is_err());
    }
}
