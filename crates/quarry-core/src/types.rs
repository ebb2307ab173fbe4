//! Core data types for Quarry.
//!
//! These types flow between the document source, the index engine and the
//! presentation layer. They are plain values: documents are never mutated
//! after creation, and match results are produced fresh for every search.

use crate::config::TruncateLimit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A document as handed to the index engine.
///
/// `path` is the unique id. Updates are modeled as delete-then-add of a new
/// value with the same path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Vault-relative path using `/` separators (e.g. "notes/daily/today.md")
    pub path: String,

    /// File name without extension (e.g. "today")
    pub basename: String,

    /// Parent folder path, empty for files at the vault root
    pub folder: String,

    /// Alternative names, space separated
    pub aliases: Option<String>,

    /// Body text; `None` for files indexed by metadata only
    pub content: Option<String>,
}

impl IndexedDocument {
    /// Create a document, deriving `basename` and `folder` from the path.
    pub fn new(path: impl Into<String>, content: Option<String>) -> Self {
        let path = path.into();
        let (folder, file_name) = match path.rsplit_once('/') {
            Some((folder, name)) => (folder.to_string(), name),
            None => (String::new(), path.as_str()),
        };
        let basename = match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => file_name.to_string(),
        };

        IndexedDocument {
            path,
            basename,
            folder,
            aliases: None,
            content,
        }
    }

    /// Set the aliases
    pub fn with_aliases(mut self, aliases: impl Into<String>) -> Self {
        self.aliases = Some(aliases.into());
        self
    }
}

/// One line of a file at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub text: String,
    pub row: usize,
}

impl Line {
    pub fn new(text: impl Into<String>, row: usize) -> Self {
        Line {
            text: text.into(),
            row,
        }
    }

    /// Split file content into numbered lines.
    pub fn split(content: &str) -> Vec<Line> {
        content
            .lines()
            .enumerate()
            .map(|(row, text)| Line::new(text, row))
            .collect()
    }
}

/// A line selected by the line matcher, with highlight information.
///
/// `col` and every entry of `positions` are character offsets into the
/// full, untruncated `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedLine {
    pub text: String,
    pub row: usize,
    pub col: usize,
    pub positions: BTreeSet<usize>,
    pub score: f64,
}

impl MatchedLine {
    /// Cut the line down to the character budget of `limit` around `col`.
    ///
    /// Elided ends are marked with an ellipsis and positions are shifted to
    /// index the excerpt text.
    pub fn excerpt(&self, limit: &TruncateLimit) -> Excerpt {
        const ELLIPSIS: char = '…';

        let chars: Vec<char> = self.text.chars().collect();
        let start = self.col.saturating_sub(limit.max_pre_chars).min(chars.len());
        let end = (self.col + limit.max_post_chars).min(chars.len()).max(start);

        let mut text = String::new();
        if start > 0 {
            text.push(ELLIPSIS);
        }
        text.extend(&chars[start..end]);
        if end < chars.len() {
            text.push(ELLIPSIS);
        }

        let shift = usize::from(start > 0);
        let positions = self
            .positions
            .iter()
            .filter(|p| (start..end).contains(*p))
            .map(|p| p - start + shift)
            .collect();

        Excerpt { text, positions }
    }
}

/// A truncated, presentation-ready rendering of a matched line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Excerpt {
    pub text: String,
    pub positions: BTreeSet<usize>,
}

/// A file-level search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedFile {
    pub path: String,

    /// Processed query terms that matched this document
    pub query_terms: Vec<String>,

    /// De-duplicated indexed terms that the query terms expanded to
    pub matched_terms: Vec<String>,

    pub score: f64,
}

/// A pending index mutation produced from a change notification.
///
/// `timestamp` is a monotonic creation stamp; a flush batch is applied in
/// ascending stamp order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocOperation {
    /// (Re)read `source_ref` and index it under `path`
    Add {
        path: String,
        source_ref: String,
        timestamp: u64,
    },
    /// Remove `path` from the index
    Delete { path: String, timestamp: u64 },
}

impl DocOperation {
    pub fn path(&self) -> &str {
        match self {
            DocOperation::Add { path, .. } | DocOperation::Delete { path, .. } => path,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            DocOperation::Add { timestamp, .. } | DocOperation::Delete { timestamp, .. } => {
                *timestamp
            }
        }
    }
}

/// A single row for presentation layers: either a file hit or a line inside one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchItem {
    File(MatchedFile),
    Line { path: String, line: MatchedLine },
}

impl SearchItem {
    pub fn path(&self) -> &str {
        match self {
            SearchItem::File(file) => &file.path,
            SearchItem::Line { path, .. } => path,
        }
    }
}

/// Lifecycle state of the index engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    Empty,
    Indexing,
    Ready,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexState::Empty => write!(f, "empty"),
            IndexState::Indexing => write!(f, "indexing"),
            IndexState::Ready => write!(f, "ready"),
        }
    }
}

/// Statistics about the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of indexed documents
    pub documents: usize,

    /// Number of distinct indexed terms
    pub terms: usize,

    /// Current engine state
    pub state: IndexState,

    /// When the index was last mutated
    pub last_updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_from_nested_path() {
        let doc = IndexedDocument::new("notes/daily/2024-01-01.md", None);
        assert_eq!(doc.basename, "2024-01-01");
        assert_eq!(doc.folder, "notes/daily");
    }

    #[test]
    fn test_document_at_root() {
        let doc = IndexedDocument::new("README", Some("hi".to_string()));
        assert_eq!(doc.basename, "README");
        assert_eq!(doc.folder, "");

        let doc = IndexedDocument::new(".hidden", None);
        assert_eq!(doc.basename, ".hidden");
    }

    #[test]
    fn test_line_split() {
        let lines = Line::split("first\nsecond\n\nfourth");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], Line::new("fourth", 3));
    }

    #[test]
    fn test_operation_accessors() {
        let op = DocOperation::Delete {
            path: "a.md".to_string(),
            timestamp: 7,
        };
        assert_eq!(op.path(), "a.md");
        assert_eq!(op.timestamp(), 7);
    }

    fn matched(text: &str, col: usize, positions: &[usize]) -> MatchedLine {
        MatchedLine {
            text: text.to_string(),
            row: 0,
            col,
            positions: positions.iter().copied().collect(),
            score: 1.0,
        }
    }

    #[test]
    fn test_excerpt_truncates_both_ends() {
        let line = matched("the quick brown fox", 10, &[10, 11, 12, 13, 14]);
        let limit = TruncateLimit {
            max_pre_chars: 4,
            max_post_chars: 7,
            ..TruncateLimit::default()
        };
        let excerpt = line.excerpt(&limit);
        assert_eq!(excerpt.text, "…ick brown f…");
        assert_eq!(excerpt.positions, BTreeSet::from([5, 6, 7, 8, 9]));
    }

    #[test]
    fn test_excerpt_short_line_untouched() {
        let line = matched("has cat", 4, &[4, 5, 6]);
        let excerpt = line.excerpt(&TruncateLimit::default());
        assert_eq!(excerpt.text, "has cat");
        assert_eq!(excerpt.positions, line.positions);
    }

    #[test]
    fn test_search_item_path() {
        let item = SearchItem::Line {
            path: "a.md".to_string(),
            line: MatchedLine {
                text: "x".to_string(),
                row: 0,
                col: 0,
                positions: BTreeSet::new(),
                score: 1.0,
            },
        };
        assert_eq!(item.path(), "a.md");
    }
}
