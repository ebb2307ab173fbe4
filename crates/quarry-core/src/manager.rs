//! The composition root tying sources, the coalescing buffer and the engine together.
//!
//! Change notifications become [`DocOperation`]s in a [`BufferSet`] keyed by
//! path. When the buffer flushes, operations are applied in creation order:
//! adds are re-read from the document source, updates become delete-then-add,
//! and a snapshot is written afterwards if configured.

use crate::buffer::BufferSet;
use crate::config::{CombineWith, Config, TruncateType};
use crate::error::{QuarryError, Result};
use crate::index::{IndexEngine, ReindexSource};
use crate::lines::LinesMatcher;
use crate::persistence::SnapshotStore;
use crate::query::QueryParser;
use crate::search::SearchOptions;
use crate::source::{ChangeKind, DocumentSource};
use crate::timing::timed;
use crate::tokenizer::Segmenter;
use crate::types::{
    DocOperation, IndexStats, IndexedDocument, Line, MatchedFile, MatchedLine, SearchItem,
};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Turn a host-side source failure into a core error.
fn source_error(err: anyhow::Error) -> QuarryError {
    match err.downcast::<QuarryError>() {
        Ok(err) => err,
        Err(err) => match err.downcast::<std::io::Error>() {
            Ok(io) => QuarryError::Io(io),
            Err(err) => QuarryError::Internal(format!("{:#}", err)),
        },
    }
}

/// Applies flushed operation batches to the engine.
struct Applier {
    config: Arc<Config>,
    engine: Arc<IndexEngine>,
    source: Arc<dyn DocumentSource>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl Applier {
    fn read(&self, path: &str, source_ref: &str) -> Option<IndexedDocument> {
        match self.source.read_document(source_ref) {
            Ok(doc) if doc.path == path => Some(doc),
            Ok(doc) => {
                let mut rekeyed = IndexedDocument::new(path, doc.content);
                rekeyed.aliases = doc.aliases;
                Some(rekeyed)
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(path = %path, error = %reason, "Skipping unreadable document");
                None
            }
        }
    }

    fn add_pending(&self, pending: &mut Vec<IndexedDocument>) {
        if pending.is_empty() {
            return;
        }
        let docs = std::mem::take(pending);
        let added = self.engine.add_documents(docs);
        debug!(added = added.len(), "Applied buffered adds");
    }

    fn apply(&self, mut batch: Vec<DocOperation>) {
        batch.sort_by_key(DocOperation::timestamp);
        let total = batch.len();

        timed("apply_batch", || {
            let mut pending: Vec<IndexedDocument> = Vec::new();

            for op in batch {
                match op {
                    DocOperation::Add {
                        path, source_ref, ..
                    } => {
                        let Some(doc) = self.read(&path, &source_ref) else {
                            continue;
                        };
                        if self.engine.contains(&path) {
                            self.engine.delete_documents(std::slice::from_ref(&path));
                        }
                        pending.push(doc);
                    }
                    DocOperation::Delete { path, .. } => {
                        self.add_pending(&mut pending);
                        self.engine.delete_documents(&[path]);
                    }
                }
            }
            self.add_pending(&mut pending);
        });

        info!(operations = total, "Flushed document operations");

        if self.config.index.save_snapshot {
            if let Err(e) = self.save_snapshot() {
                error!(error = %e, "Failed to save snapshot after flush");
            }
        }
    }

    fn save_snapshot(&self) -> Result<()> {
        let blob = self.engine.serialize()?;
        self.snapshots.save_snapshot(&blob)
    }
}

/// Owns the search pipeline for one vault.
///
/// ## Example
///
/// ```rust
/// use quarry_core::{
///     ChangeKind, Config, DataManager, MemoryDocumentSource, MemorySnapshotStore,
/// };
/// use std::sync::Arc;
///
/// let source = Arc::new(MemoryDocumentSource::new());
/// source.insert("notes/rust.md", "ownership and borrowing");
///
/// let manager = DataManager::new(
///     Arc::new(Config::default()),
///     source.clone(),
///     Arc::new(MemorySnapshotStore::new()),
///     None,
/// );
/// manager.initialize().unwrap();
///
/// source.insert("notes/go.md", "goroutines and channels");
/// manager.notify_document_changed("notes/go.md", ChangeKind::Created);
/// manager.flush();
///
/// let hits = manager.search("channels").unwrap();
/// assert_eq!(hits[0].path, "notes/go.md");
/// ```
pub struct DataManager {
    config: Arc<Config>,
    applier: Arc<Applier>,
    parser: QueryParser,
    lines: LinesMatcher,
    buffer: BufferSet<DocOperation, String>,
    clock: AtomicU64,
}

impl DataManager {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn DocumentSource>,
        snapshots: Arc<dyn SnapshotStore>,
        segmenter: Option<Arc<dyn Segmenter>>,
    ) -> Self {
        let engine = Arc::new(IndexEngine::new(Arc::clone(&config), segmenter));
        let applier = Arc::new(Applier {
            config: Arc::clone(&config),
            engine,
            source,
            snapshots,
        });

        let handler_applier = Arc::clone(&applier);
        let buffer = BufferSet::new(
            move |batch| handler_applier.apply(batch),
            |op: &DocOperation| op.path().to_string(),
            config.index.flush_threshold,
            Duration::from_millis(config.index.flush_cooldown_ms),
        );

        DataManager {
            parser: QueryParser::from_config(&config.search),
            lines: LinesMatcher::from_config(&config),
            config,
            applier,
            buffer,
            clock: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn engine(&self) -> &Arc<IndexEngine> {
        &self.applier.engine
    }

    pub fn stats(&self) -> IndexStats {
        self.applier.engine.stats()
    }

    /// Number of buffered operations not yet applied.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Load the stored snapshot, falling back to a full reindex.
    ///
    /// Returns the number of indexed documents.
    pub fn initialize(&self) -> Result<usize> {
        timed("initialize", || {
            let blob = match self.applier.snapshots.load_snapshot() {
                Ok(blob) => blob,
                Err(e) => {
                    warn!(error = %e, "Could not read snapshot, reindexing");
                    None
                }
            };

            let Some(blob) = blob else {
                return self.force_reindex_all();
            };

            match self.applier.engine.reindex_all(ReindexSource::Snapshot(blob)) {
                Ok(count) => Ok(count),
                Err(e) if e.requires_reindex() => {
                    warn!(error = %e, "Snapshot rejected, reindexing from documents");
                    self.force_reindex_all()
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Rebuild the whole index from the document source.
    pub fn force_reindex_all(&self) -> Result<usize> {
        timed("reindex_all", || {
            let paths = self
                .applier
                .source
                .enumerate_documents()
                .map_err(source_error)?;
            info!(documents = paths.len(), "Reading documents for reindex");

            let docs: Vec<IndexedDocument> = paths
                .par_iter()
                .filter_map(|path| self.applier.read(path, path))
                .collect();

            let count = self
                .applier
                .engine
                .reindex_all(ReindexSource::Documents(docs))?;

            if self.config.index.save_snapshot {
                if let Err(e) = self.applier.save_snapshot() {
                    error!(error = %e, "Failed to save snapshot after reindex");
                }
            }
            Ok(count)
        })
    }

    /// Persist the current index.
    pub fn save_snapshot(&self) -> Result<()> {
        timed("save_snapshot", || self.applier.save_snapshot())
    }

    /// Queue the index changes implied by a change notification.
    pub fn notify_document_changed(&self, path: &str, kind: ChangeKind) {
        debug!(path = %path, kind = %kind, "Document changed");

        if let ChangeKind::Renamed { old_path } = &kind {
            self.queue_delete(old_path);
        }

        if self.config.should_exclude(path) {
            debug!(path = %path, "Ignoring excluded path");
            return;
        }

        match kind {
            ChangeKind::Deleted => self.queue_delete(path),
            ChangeKind::Created | ChangeKind::Modified | ChangeKind::Renamed { .. } => {
                self.buffer.add(DocOperation::Add {
                    path: path.to_string(),
                    source_ref: path.to_string(),
                    timestamp: self.tick(),
                })
            }
        }
    }

    /// Queue a delete for `path`, or for every indexed file under it when
    /// `path` names a folder.
    fn queue_delete(&self, path: &str) {
        let mut paths = Vec::new();
        if !self.applier.engine.contains(path) {
            paths = self.applier.engine.paths_under(path);
        }
        if paths.is_empty() {
            paths.push(path.to_string());
        }
        for path in paths {
            self.buffer.add(DocOperation::Delete {
                path,
                timestamp: self.tick(),
            });
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Apply every buffered operation now. Returns how many were applied.
    pub fn flush(&self) -> usize {
        self.buffer.force_flush()
    }

    /// Search with the configured combine mode.
    pub fn search(&self, raw: &str) -> Result<Vec<MatchedFile>> {
        self.search_with(raw, self.config.search.combine_with)
    }

    /// Search with an explicit combine mode.
    pub fn search_with(&self, raw: &str, combine_with: CombineWith) -> Result<Vec<MatchedFile>> {
        let parsed = self.parser.parse(raw);
        if parsed.text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let options = SearchOptions::from_config(&self.config.search)
            .with_query(parsed.options)
            .with_combine(combine_with);
        timed("search", || self.applier.engine.search(&parsed.text, &options))
    }

    /// The most relevant lines of one file for a query, best first.
    pub fn get_line_matches(
        &self,
        path: &str,
        raw: &str,
        max_lines: usize,
    ) -> Result<Vec<MatchedLine>> {
        self.get_line_matches_with(path, raw, max_lines, self.config.search.combine_with)
    }

    /// Line matches under an explicit combine mode.
    ///
    /// The document must match under the same mode a preceding
    /// [`search_with`](Self::search_with) used, or nothing is returned.
    pub fn get_line_matches_with(
        &self,
        path: &str,
        raw: &str,
        max_lines: usize,
        combine_with: CombineWith,
    ) -> Result<Vec<MatchedLine>> {
        let parsed = self.parser.parse(raw);
        if parsed.text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let options = SearchOptions::from_config(&self.config.search)
            .with_query(parsed.options)
            .with_combine(combine_with);
        let Some(hit) = self
            .applier
            .engine
            .match_document(path, &parsed.text, &options)?
        else {
            return Ok(Vec::new());
        };

        let content = self
            .applier
            .source
            .read_content(path)
            .map_err(source_error)?;
        let lines = Line::split(&content);

        Ok(timed("match_lines", || {
            self.lines.match_lines(
                &lines,
                &hit.query_terms,
                &hit.matched_terms,
                max_lines,
                TruncateType::Line,
                options.prefix,
            )
        }))
    }

    /// File hits each followed by their best lines, for list presentation.
    pub fn search_items(&self, raw: &str, lines_per_file: usize) -> Result<Vec<SearchItem>> {
        self.search_items_with(raw, lines_per_file, self.config.search.combine_with)
    }

    /// [`search_items`](Self::search_items) with an explicit combine mode.
    pub fn search_items_with(
        &self,
        raw: &str,
        lines_per_file: usize,
        combine_with: CombineWith,
    ) -> Result<Vec<SearchItem>> {
        let files = self.search_with(raw, combine_with)?;
        let mut items = Vec::with_capacity(files.len() * (1 + lines_per_file));

        for file in files {
            let lines = if lines_per_file > 0 {
                match self.get_line_matches_with(&file.path, raw, lines_per_file, combine_with) {
                    Ok(lines) => lines,
                    Err(e) => {
                        warn!(path = %file.path, error = %e, "Could not match lines");
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };

            let path = file.path.clone();
            items.push(SearchItem::File(file));
            items.extend(lines.into_iter().map(|line| SearchItem::Line {
                path: path.clone(),
                line,
            }));
        }
        Ok(items)
    }
}
