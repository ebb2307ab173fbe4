//! In-memory inverted index over vault documents.
//!
//! The `IndexEngine` owns the index and is the only component that mutates
//! it. It supports:
//!
//! - Bulk (re)indexing from documents or from a snapshot blob
//! - Incremental add and delete by path
//! - Ranked search with prefix and fuzzy expansion (see [`crate::search`])
//!
//! ## Architecture
//!
//! - `IndexData` holds a `Vec<Option<StoredDoc>>` (deleted slots become
//!   `None`) and a sorted `BTreeMap` of term postings, so prefix expansion is
//!   a range scan
//! - A `DashMap` maps document paths to slots for O(1) membership checks
//! - Mutations are serialized by a dedicated lock; searches take a read lock
//!   and check the readiness flag first
//!
//! Document analysis (tokenizing every field) runs in parallel with Rayon
//! outside the write lock; only the insertion itself holds it.

use crate::config::Config;
use crate::error::{QuarryError, Result};
use crate::persistence::{decode_snapshot, encode_snapshot};
use crate::search::{self, Field, SearchOptions};
use crate::tokenizer::{Segmenter, Tokenizer};
use crate::types::{IndexState, IndexStats, IndexedDocument, MatchedFile};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// One (document, field) occurrence of a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Posting {
    pub doc: u32,
    pub field: Field,
}

/// What the index remembers about a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredDoc {
    pub path: String,

    /// Every term this document contributed, for removal
    pub terms: Vec<String>,

    /// Token count per field, indexed by `Field::slot`
    pub field_lengths: [u32; 4],
}

/// The index proper. This is also the snapshot payload.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct IndexData {
    pub docs: Vec<Option<StoredDoc>>,

    /// Term → postings, ordered by document slot
    pub postings: BTreeMap<String, Vec<Posting>>,

    /// Sum of field lengths over live documents, indexed by `Field::slot`
    pub field_totals: [u64; 4],

    /// Number of live documents
    pub live: usize,
}

impl IndexData {
    pub fn doc(&self, slot: u32) -> Option<&StoredDoc> {
        self.docs.get(slot as usize)?.as_ref()
    }

    /// Number of distinct documents containing `term`.
    pub fn doc_freq(&self, term: &str) -> usize {
        let Some(postings) = self.postings.get(term) else {
            return 0;
        };
        let mut count = 0;
        let mut last = None;
        for posting in postings {
            if last != Some(posting.doc) {
                count += 1;
                last = Some(posting.doc);
            }
        }
        count
    }

    pub fn avg_field_len(&self, field: Field) -> f64 {
        if self.live == 0 {
            return 0.0;
        }
        self.field_totals[field.slot()] as f64 / self.live as f64
    }

    fn insert(&mut self, doc: AnalyzedDoc) -> u32 {
        let slot = self.docs.len() as u32;
        let mut terms = BTreeSet::new();
        let mut field_lengths = [0u32; 4];

        for (field, tokens) in doc.fields {
            field_lengths[field.slot()] = tokens.len() as u32;
            self.field_totals[field.slot()] += tokens.len() as u64;
            for token in tokens {
                self.postings
                    .entry(token.clone())
                    .or_default()
                    .push(Posting { doc: slot, field });
                terms.insert(token);
            }
        }

        self.docs.push(Some(StoredDoc {
            path: doc.path,
            terms: terms.into_iter().collect(),
            field_lengths,
        }));
        self.live += 1;
        slot
    }

    fn remove(&mut self, slot: u32) -> Option<String> {
        let doc = self.docs.get_mut(slot as usize)?.take()?;

        for term in &doc.terms {
            if let Some(postings) = self.postings.get_mut(term) {
                postings.retain(|p| p.doc != slot);
                if postings.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        for (total, len) in self.field_totals.iter_mut().zip(doc.field_lengths) {
            *total = total.saturating_sub(len as u64);
        }
        self.live -= 1;
        Some(doc.path)
    }

    /// Reject decoded payloads whose internal references do not line up.
    fn validate(&self) -> Result<()> {
        let live = self.docs.iter().filter(|d| d.is_some()).count();
        if live != self.live {
            return Err(QuarryError::snapshot("live document count mismatch"));
        }
        for postings in self.postings.values() {
            if postings.iter().any(|p| self.doc(p.doc).is_none()) {
                return Err(QuarryError::snapshot("posting refers to a missing document"));
            }
        }
        Ok(())
    }
}

/// A document with every field tokenized and normalized.
struct AnalyzedDoc {
    path: String,
    fields: Vec<(Field, BTreeSet<String>)>,
}

/// Where a full reindex takes its contents from.
pub enum ReindexSource {
    Documents(Vec<IndexedDocument>),
    Snapshot(Vec<u8>),
}

impl IndexState {
    fn to_u8(self) -> u8 {
        match self {
            IndexState::Empty => 0,
            IndexState::Indexing => 1,
            IndexState::Ready => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => IndexState::Indexing,
            2 => IndexState::Ready,
            _ => IndexState::Empty,
        }
    }
}

/// The search engine over one vault.
///
/// ## Example
///
/// ```rust
/// use quarry_core::{Config, IndexEngine, IndexedDocument, SearchOptions};
/// use std::sync::Arc;
///
/// let config = Arc::new(Config::default());
/// let engine = IndexEngine::new(config.clone(), None);
/// engine.add_documents(vec![IndexedDocument::new(
///     "notes/rust.md",
///     Some("ownership and borrowing".to_string()),
/// )]);
///
/// let options = SearchOptions::from_config(&config.search);
/// let hits = engine.search("borrow", &options).unwrap();
/// assert_eq!(hits[0].path, "notes/rust.md");
/// ```
pub struct IndexEngine {
    config: Arc<Config>,
    tokenizer: Tokenizer,
    state: AtomicU8,

    /// Serializes add, delete, reindex and serialize
    mutation: Mutex<()>,

    data: RwLock<IndexData>,

    /// Map from document path to slot in `data.docs`
    ids: DashMap<String, u32>,

    last_updated: RwLock<Option<DateTime<Utc>>>,
}

impl IndexEngine {
    /// Create an empty engine. Without a segmenter CJK text is indexed unsegmented.
    pub fn new(config: Arc<Config>, segmenter: Option<Arc<dyn Segmenter>>) -> Self {
        let tokenizer = Tokenizer::from_config(&config, segmenter);
        IndexEngine {
            config,
            tokenizer,
            state: AtomicU8::new(IndexState::Empty.to_u8()),
            mutation: Mutex::new(()),
            data: RwLock::new(IndexData::default()),
            ids: DashMap::new(),
            last_updated: RwLock::new(None),
        }
    }

    pub fn state(&self) -> IndexState {
        IndexState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// False while a reindex is running.
    pub fn is_ready(&self) -> bool {
        self.state() != IndexState::Indexing
    }

    fn set_state(&self, state: IndexState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.ids.contains_key(path)
    }

    /// Indexed paths inside the folder `dir`, sorted.
    pub fn paths_under(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut paths: Vec<String> = self
            .ids
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.key().clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn stats(&self) -> IndexStats {
        let data = self.data.read();
        IndexStats {
            documents: data.live,
            terms: data.postings.len(),
            state: self.state(),
            last_updated: *self.last_updated.read(),
        }
    }

    /// Tokenize and normalize text the same way documents are indexed.
    pub fn analyze_text(&self, text: &str) -> BTreeSet<String> {
        self.tokenizer
            .tokenize(text)
            .into_iter()
            .map(|token| self.normalize(token))
            .collect()
    }

    fn normalize(&self, token: String) -> String {
        if self.config.search.case_sensitive {
            token
        } else {
            token.to_lowercase()
        }
    }

    fn analyze(&self, doc: &IndexedDocument) -> AnalyzedDoc {
        let mut fields = Vec::with_capacity(Field::ALL.len());
        for field in Field::ALL {
            let text = match field {
                Field::Basename => Some(doc.basename.as_str()),
                Field::Aliases => doc.aliases.as_deref(),
                Field::Folder => Some(doc.folder.as_str()),
                Field::Content => doc.content.as_deref(),
            };
            if let Some(text) = text.filter(|t| !t.is_empty()) {
                let tokens = self.analyze_text(text);
                if !tokens.is_empty() {
                    fields.push((field, tokens));
                }
            }
        }
        AnalyzedDoc {
            path: doc.path.clone(),
            fields,
        }
    }

    fn touch(&self) {
        *self.last_updated.write() = Some(Utc::now());
    }

    /// Insert documents that are not indexed yet. Caller holds the mutation lock.
    fn insert_documents(&self, docs: Vec<IndexedDocument>) -> Vec<String> {
        let mut seen = HashSet::new();
        let fresh: Vec<IndexedDocument> = docs
            .into_iter()
            .filter(|doc| !self.ids.contains_key(&doc.path) && seen.insert(doc.path.clone()))
            .collect();

        let chunk_size = self.config.index.chunk_size.max(1);
        let mut added = Vec::with_capacity(fresh.len());

        for chunk in fresh.chunks(chunk_size) {
            let analyzed: Vec<AnalyzedDoc> = chunk.par_iter().map(|doc| self.analyze(doc)).collect();

            let mut data = self.data.write();
            for doc in analyzed {
                let path = doc.path.clone();
                let slot = data.insert(doc);
                self.ids.insert(path.clone(), slot);
                added.push(path);
            }
            debug!(chunk = chunk.len(), total = added.len(), "Indexed document chunk");
        }

        if !added.is_empty() {
            self.touch();
        }
        added
    }

    fn clear_locked(&self) {
        *self.data.write() = IndexData::default();
        self.ids.clear();
    }

    /// Replace the whole index. Queues behind any mutation in progress.
    ///
    /// A snapshot that cannot be loaded leaves the engine empty and ready and
    /// returns `SnapshotIncompatible`; the caller should reindex from documents.
    #[instrument(skip(self, source))]
    pub fn reindex_all(&self, source: ReindexSource) -> Result<usize> {
        let _guard = self.mutation.lock();
        self.set_state(IndexState::Indexing);
        self.clear_locked();

        let result = match source {
            ReindexSource::Documents(docs) => {
                info!(documents = docs.len(), "Reindexing from documents");
                Ok(self.insert_documents(docs).len())
            }
            ReindexSource::Snapshot(blob) => self.load_snapshot_locked(&blob),
        };

        self.set_state(IndexState::Ready);
        match &result {
            Ok(count) => info!(documents = count, "Reindex complete"),
            Err(e) => warn!(error = %e, "Reindex failed, index left empty"),
        }
        result
    }

    fn load_snapshot_locked(&self, blob: &[u8]) -> Result<usize> {
        let data: IndexData = decode_snapshot(blob, &self.config.tokenizer_fingerprint())?;
        data.validate()?;

        for (slot, doc) in data.docs.iter().enumerate() {
            if let Some(doc) = doc {
                self.ids.insert(doc.path.clone(), slot as u32);
            }
        }
        let count = data.live;
        *self.data.write() = data;
        self.touch();
        info!(documents = count, "Loaded index from snapshot");
        Ok(count)
    }

    /// Add documents whose path is not indexed yet; returns the added paths.
    #[instrument(skip(self, docs), fields(count = docs.len()))]
    pub fn add_documents(&self, docs: Vec<IndexedDocument>) -> Vec<String> {
        let _guard = self.mutation.lock();
        let added = self.insert_documents(docs);
        if self.state() == IndexState::Empty {
            self.set_state(IndexState::Ready);
        }
        added
    }

    /// Remove documents by path; unknown paths are ignored.
    #[instrument(skip(self, paths), fields(count = paths.len()))]
    pub fn delete_documents(&self, paths: &[String]) -> Vec<String> {
        let _guard = self.mutation.lock();
        let mut data = self.data.write();

        let removed: Vec<String> = paths
            .iter()
            .filter_map(|path| {
                let (_, slot) = self.ids.remove(path)?;
                data.remove(slot)
            })
            .collect();
        drop(data);

        if !removed.is_empty() {
            debug!(removed = removed.len(), "Deleted documents");
            self.touch();
        }
        removed
    }

    fn query_terms(&self, text: &str) -> Vec<String> {
        self.analyze_text(text).into_iter().collect()
    }

    /// Ranked search over all documents.
    pub fn search(&self, text: &str, options: &SearchOptions) -> Result<Vec<MatchedFile>> {
        // A reindex flips the state before it can take the write lock, so
        // a ready state observed under the read lock stays valid until release.
        let data = self.data.read();
        if !self.is_ready() {
            return Err(QuarryError::NotReady);
        }

        let terms = self.query_terms(text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        Ok(search::run(&data, &terms, options, &self.config.search, None))
    }

    /// Match `text` against a single document.
    ///
    /// Returns `None` if the path is not indexed or the document does not match.
    pub fn match_document(
        &self,
        path: &str,
        text: &str,
        options: &SearchOptions,
    ) -> Result<Option<MatchedFile>> {
        let data = self.data.read();
        if !self.is_ready() {
            return Err(QuarryError::NotReady);
        }

        let Some(slot) = self.ids.get(path).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        let terms = self.query_terms(text);
        if terms.is_empty() {
            return Ok(None);
        }

        Ok(search::run(&data, &terms, options, &self.config.search, Some(slot))
            .into_iter()
            .next())
    }

    /// Encode the current index as a snapshot blob.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let _guard = self.mutation.lock();
        let data = self.data.read();
        encode_snapshot(&self.config.tokenizer_fingerprint(), &*data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CombineWith;
    use crate::error::Result as QResult;
    use crossbeam_channel::{bounded, Receiver, Sender};
    use std::thread;
    use std::time::Duration;

    fn engine() -> IndexEngine {
        IndexEngine::new(Arc::new(Config::default()), None)
    }

    fn doc(path: &str, content: &str) -> IndexedDocument {
        IndexedDocument::new(path, Some(content.to_string()))
    }

    fn options(engine: &IndexEngine) -> SearchOptions {
        SearchOptions::from_config(&engine.config.search)
    }

    fn paths(results: &[MatchedFile]) -> Vec<&str> {
        results.iter().map(|r| r.path.as_str()).collect()
    }

    #[test]
    fn test_states() {
        let engine = engine();
        assert_eq!(engine.state(), IndexState::Empty);
        assert!(engine.search("anything", &options(&engine)).unwrap().is_empty());

        engine.add_documents(vec![doc("a.md", "hello")]);
        assert_eq!(engine.state(), IndexState::Ready);

        engine
            .reindex_all(ReindexSource::Documents(vec![doc("b.md", "hello")]))
            .unwrap();
        assert_eq!(engine.state(), IndexState::Ready);
        assert!(!engine.contains("a.md"));
        assert!(engine.contains("b.md"));
    }

    #[test]
    fn test_add_skips_existing_paths() {
        let engine = engine();
        let added = engine.add_documents(vec![doc("a.md", "one"), doc("a.md", "two")]);
        assert_eq!(added, vec!["a.md".to_string()]);

        let added = engine.add_documents(vec![doc("a.md", "three"), doc("b.md", "four")]);
        assert_eq!(added, vec!["b.md".to_string()]);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_chunked_insert() {
        let mut config = Config::default();
        config.index.chunk_size = 2;
        let engine = IndexEngine::new(Arc::new(config), None);

        let docs: Vec<IndexedDocument> = (0..7)
            .map(|i| doc(&format!("n{}.md", i), "shared words"))
            .collect();
        assert_eq!(engine.add_documents(docs).len(), 7);
        assert_eq!(engine.search("shared", &options(&engine)).unwrap().len(), 7);
    }

    #[test]
    fn test_add_then_delete_restores_results() {
        let engine = engine();
        engine.add_documents(vec![doc("a.md", "alpha beta"), doc("b.md", "alpha")]);
        let before = engine.search("alpha", &options(&engine)).unwrap();
        let stats_before = engine.stats();

        engine.add_documents(vec![doc("c.md", "alpha gamma")]);
        assert_eq!(engine.search("alpha", &options(&engine)).unwrap().len(), 3);

        let removed = engine.delete_documents(&["c.md".to_string(), "missing.md".to_string()]);
        assert_eq!(removed, vec!["c.md".to_string()]);

        let after = engine.search("alpha", &options(&engine)).unwrap();
        assert_eq!(before, after);
        assert_eq!(engine.stats().terms, stats_before.terms);
        assert!(engine.search("gamma", &options(&engine)).unwrap().is_empty());
    }

    #[test]
    fn test_and_or_combination() {
        let engine = engine();
        engine.add_documents(vec![doc("a.md", "alpha beta"), doc("b.md", "alpha")]);

        let and = options(&engine).with_combine(CombineWith::And);
        assert_eq!(paths(&engine.search("alpha beta", &and).unwrap()), vec!["a.md"]);

        let or = options(&engine).with_combine(CombineWith::Or);
        assert_eq!(
            paths(&engine.search("alpha beta", &or).unwrap()),
            vec!["a.md", "b.md"]
        );
    }

    #[test]
    fn test_prefix_matching() {
        let engine = engine();
        engine.add_documents(vec![doc("a.md", "category theory")]);

        let prefix = options(&engine);
        let hits = engine.search("categ", &prefix).unwrap();
        assert_eq!(paths(&hits), vec!["a.md"]);
        assert_eq!(hits[0].matched_terms, vec!["category".to_string()]);
        assert_eq!(hits[0].query_terms, vec!["categ".to_string()]);

        let mut exact = prefix;
        exact.prefix = false;
        assert!(engine.search("categ", &exact).unwrap().is_empty());
    }

    #[test]
    fn test_prefix_min_length() {
        let mut config = Config::default();
        config.search.min_prefix_length = 4;
        let engine = IndexEngine::new(Arc::new(config), None);
        engine.add_documents(vec![doc("a.md", "category")]);

        assert!(engine.search("cat", &options(&engine)).unwrap().is_empty());
        assert_eq!(engine.search("cate", &options(&engine)).unwrap().len(), 1);
    }

    #[test]
    fn test_fuzzy_matching() {
        let engine = engine();
        engine.add_documents(vec![doc("a.md", "hello world")]);

        let mut fuzzy = options(&engine);
        fuzzy.fuzzy = true;
        fuzzy.prefix = false;
        let hits = engine.search("helo", &fuzzy).unwrap();
        assert_eq!(paths(&hits), vec!["a.md"]);
        assert_eq!(hits[0].matched_terms, vec!["hello".to_string()]);

        fuzzy.fuzzy = false;
        assert!(engine.search("helo", &fuzzy).unwrap().is_empty());
    }

    #[test]
    fn test_short_terms_are_not_fuzzy() {
        let engine = engine();
        engine.add_documents(vec![doc("a.md", "cat")]);

        let mut fuzzy = options(&engine);
        fuzzy.fuzzy = true;
        fuzzy.prefix = false;
        assert!(engine.search("cot", &fuzzy).unwrap().is_empty());
    }

    #[test]
    fn test_field_boosts() {
        let engine = engine();
        engine.add_documents(vec![
            doc("notes/other.md", "a note about rust"),
            doc("notes/rust.md", "a note about something"),
        ]);
        let hits = engine.search("rust", &options(&engine)).unwrap();
        assert_eq!(paths(&hits), vec!["notes/rust.md", "notes/other.md"]);

        let hits = engine.search("notes", &options(&engine)).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_aliases_are_searchable() {
        let engine = engine();
        engine.add_documents(vec![
            IndexedDocument::new("people/jdoe.md", Some("contact card".to_string()))
                .with_aliases("Jane Doe"),
        ]);
        assert_eq!(engine.search("jane", &options(&engine)).unwrap().len(), 1);
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let engine = engine();
        engine.add_documents(vec![doc("a.md", "Hello World")]);
        assert_eq!(engine.search("HELLO", &options(&engine)).unwrap().len(), 1);

        let mut config = Config::default();
        config.search.case_sensitive = true;
        let sensitive = IndexEngine::new(Arc::new(config), None);
        sensitive.add_documents(vec![doc("a.md", "Hello World")]);
        let mut exact = options(&sensitive);
        exact.prefix = false;
        assert!(sensitive.search("hello", &exact).unwrap().is_empty());
        assert_eq!(sensitive.search("Hello", &exact).unwrap().len(), 1);
    }

    #[test]
    fn test_max_results_and_ordering() {
        let mut config = Config::default();
        config.search.max_results = 3;
        let engine = IndexEngine::new(Arc::new(config), None);
        let docs: Vec<IndexedDocument> = ["e", "d", "c", "b", "a"]
            .iter()
            .map(|name| doc(&format!("{}x.md", name), "same text"))
            .collect();
        engine.add_documents(docs);

        let hits = engine.search("same", &options(&engine)).unwrap();
        assert_eq!(paths(&hits), vec!["ax.md", "bx.md", "cx.md"]);
    }

    #[test]
    fn test_match_document() {
        let engine = engine();
        engine.add_documents(vec![doc("a.md", "alpha beta"), doc("b.md", "alpha")]);
        let opts = options(&engine);

        let hit = engine.match_document("b.md", "alpha", &opts).unwrap().unwrap();
        assert_eq!(hit.path, "b.md");
        assert!(engine.match_document("b.md", "beta", &opts).unwrap().is_none());
        assert!(engine.match_document("zzz.md", "alpha", &opts).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let engine = engine();
        engine.add_documents(vec![doc("a.md", "alpha beta"), doc("b.md", "alpha")]);
        engine.delete_documents(&["b.md".to_string()]);
        let blob = engine.serialize().unwrap();

        let restored = self::engine();
        let count = restored.reindex_all(ReindexSource::Snapshot(blob)).unwrap();
        assert_eq!(count, 1);
        assert!(restored.contains("a.md"));
        assert_eq!(
            engine.search("alpha", &options(&engine)).unwrap(),
            restored.search("alpha", &options(&restored)).unwrap()
        );
    }

    #[test]
    fn test_incompatible_snapshot_leaves_empty_ready() {
        let engine = engine();
        engine.add_documents(vec![doc("a.md", "alpha")]);
        let blob = engine.serialize().unwrap();

        let mut config = Config::default();
        config.index.cjk_patch = false;
        let other = IndexEngine::new(Arc::new(config), None);
        other.add_documents(vec![doc("old.md", "stale")]);

        let err = other.reindex_all(ReindexSource::Snapshot(blob)).unwrap_err();
        assert!(err.requires_reindex());
        assert_eq!(other.state(), IndexState::Ready);
        assert!(other.is_empty());

        let err = other
            .reindex_all(ReindexSource::Snapshot(b"garbage".to_vec()))
            .unwrap_err();
        assert!(matches!(err, QuarryError::SnapshotIncompatible { .. }));
    }

    /// Blocks inside `cut` until released, to hold a reindex in progress.
    struct GateSegmenter {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl Segmenter for GateSegmenter {
        fn init(&self) -> QResult<()> {
            Ok(())
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn cut(&self, text: &str, _use_hmm: bool) -> QResult<Vec<String>> {
            let _ = self.entered.send(());
            let _ = self.release.recv_timeout(Duration::from_secs(5));
            Ok(vec![text.to_string()])
        }
    }

    #[test]
    fn test_search_during_reindex_is_not_ready() {
        let (entered_tx, entered_rx) = bounded(4);
        let (release_tx, release_rx) = bounded(4);
        let segmenter: Arc<dyn Segmenter> = Arc::new(GateSegmenter {
            entered: entered_tx,
            release: release_rx,
        });
        let engine = Arc::new(IndexEngine::new(
            Arc::new(Config::default()),
            Some(segmenter),
        ));

        let worker = Arc::clone(&engine);
        let handle = thread::spawn(move || {
            worker.reindex_all(ReindexSource::Documents(vec![doc("cjk.md", "中文")]))
        });

        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!engine.is_ready());
        assert!(matches!(
            engine.search("中文", &options(&engine)),
            Err(QuarryError::NotReady)
        ));

        // One release for the reindex, one for the query below
        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), 1);
        assert!(engine.is_ready());
        assert_eq!(engine.search("中文", &options(&engine)).unwrap().len(), 1);
    }

    #[test]
    fn test_search_never_sees_partial_reindex() {
        let mut config = Config::default();
        config.index.chunk_size = 1;
        let engine = Arc::new(IndexEngine::new(Arc::new(config), None));
        let docs: Vec<IndexedDocument> = (0..8)
            .map(|i| doc(&format!("n{}.md", i), "shared alpha"))
            .collect();
        engine.add_documents(docs.clone());

        let worker = Arc::clone(&engine);
        let handle = thread::spawn(move || {
            for _ in 0..50 {
                worker
                    .reindex_all(ReindexSource::Documents(docs.clone()))
                    .unwrap();
            }
        });

        let options = options(&engine);
        while !handle.is_finished() {
            match engine.search("shared", &options) {
                Ok(hits) => assert_eq!(hits.len(), 8),
                Err(e) => assert!(matches!(e, QuarryError::NotReady)),
            }
            match engine.match_document("n7.md", "shared", &options) {
                Ok(hit) => assert_eq!(hit.map(|h| h.path).as_deref(), Some("n7.md")),
                Err(e) => assert!(matches!(e, QuarryError::NotReady)),
            }
        }
        handle.join().unwrap();
        assert_eq!(engine.search("shared", &options).unwrap().len(), 8);
    }

    #[test]
    fn test_paths_under() {
        let engine = engine();
        engine.add_documents(vec![
            doc("notes/b.md", "x"),
            doc("notes/a.md", "x"),
            doc("notes/deep/c.md", "x"),
            doc("notes.md", "x"),
            doc("notesx/d.md", "x"),
        ]);
        assert_eq!(
            engine.paths_under("notes"),
            vec!["notes/a.md", "notes/b.md", "notes/deep/c.md"]
        );
        assert_eq!(engine.paths_under("notes/deep/"), vec!["notes/deep/c.md"]);
        assert!(engine.paths_under("missing").is_empty());
    }

    #[test]
    fn test_stats() {
        let engine = engine();
        assert!(engine.stats().last_updated.is_none());
        engine.add_documents(vec![doc("a.md", "alpha beta")]);

        let stats = engine.stats();
        assert_eq!(stats.documents, 1);
        assert!(stats.terms >= 2);
        assert_eq!(stats.state, IndexState::Ready);
        assert!(stats.last_updated.is_some());
    }
}
