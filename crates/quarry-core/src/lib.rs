//! # Quarry Core Library
//!
//! Incremental lexical search over a vault of notes. The crate tokenizes
//! documents (with optional CJK segmentation), keeps an in-memory inverted
//! index with BM25 ranking, and picks the best matching lines of a file for
//! highlighting. Vault access is abstracted behind [`DocumentSource`], and
//! persistence behind [`SnapshotStore`].
//!
//! ## Architecture
//!
//! - **Tokenizer** (`tokenizer`): Term extraction and CJK segmentation
//! - **Query** (`query`): Leading `/xx` command parsing
//! - **Index** (`index`, `search`): Field-weighted inverted index and ranking
//! - **Lines** (`lines`, `heap`): Per-line matching, scoring and highlights
//! - **Buffer** (`buffer`): Keyed, throttled coalescing of change notifications
//! - **Manager** (`manager`): Wires sources, buffer, engine and snapshots together
//! - **Persistence** (`persistence`): Versioned, checksummed index snapshots
//! - **Config** (`config`): TOML configuration
//!
//! ## Example
//!
//! ```rust
//! use quarry_core::{Config, IndexEngine, IndexedDocument, SearchOptions};
//! use std::sync::Arc;
//!
//! let config = Arc::new(Config::default());
//! let engine = IndexEngine::new(config.clone(), None);
//! engine.add_documents(vec![IndexedDocument::new(
//!     "recipes/bread.md",
//!     Some("flour water salt yeast".to_string()),
//! )]);
//!
//! let options = SearchOptions::from_config(&config.search);
//! let hits = engine.search("yeast", &options).unwrap();
//! assert_eq!(hits[0].path, "recipes/bread.md");
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod heap;
pub mod index;
pub mod lines;
pub mod manager;
pub mod persistence;
pub mod query;
pub mod search;
pub mod source;
pub mod timing;
pub mod tokenizer;
pub mod types;

// Re-export commonly used types
pub use buffer::BufferSet;
pub use config::{CombineWith, Config, TruncateType};
pub use error::{QuarryError, Result};
pub use heap::PriorityQueue;
pub use index::{IndexEngine, ReindexSource};
pub use lines::LinesMatcher;
pub use manager::DataManager;
pub use persistence::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use query::{ParsedQuery, QueryOptions, QueryParser};
pub use search::{Field, SearchOptions};
pub use source::{ChangeKind, DocumentSource, FsDocumentSource, MemoryDocumentSource};
pub use tokenizer::{JiebaSegmenter, Segmenter, Tokenizer};
pub use types::{
    DocOperation, Excerpt, IndexState, IndexStats, IndexedDocument, Line, MatchedFile,
    MatchedLine, SearchItem,
};
