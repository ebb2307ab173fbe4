//! Configuration management for Quarry.
//!
//! Configuration is an immutable value loaded once from TOML and shared as
//! `Arc<Config>`. A changed configuration is applied by building new
//! components from the new value; options that affect tokenization are part
//! of the snapshot fingerprint so a stale snapshot is rejected on load.

use crate::error::{QuarryError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Bumped whenever tokenization or term processing changes.
const TOKENIZER_REVISION: u32 = 1;

/// Main configuration structure for Quarry.
///
/// ## Example Configuration File (quarry.toml)
///
/// ```toml
/// [general]
/// vault_path = "/home/me/notes"
///
/// [search]
/// prefix_match = true
/// fuzzy_match = false
/// combine_with = "and"
///
/// [search.weights]
/// basename = 3.0
/// content = 1.0
///
/// [index]
/// cjk_patch = true
/// exclude = [".trash/**", "*.excalidraw.md"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Query matching and ranking
    pub search: SearchConfig,

    /// Indexing behavior
    pub index: IndexConfig,

    /// Excerpt budgets for highlighted lines
    pub truncate: TruncateConfig,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root directory of the vault to index
    pub vault_path: Option<PathBuf>,

    /// Snapshot directory (None = default data directory)
    pub data_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            vault_path: None,
            data_path: None,
            log_level: "info".to_string(),
        }
    }
}

/// How the per-term matches of a query are combined into a file match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineWith {
    /// Every query term must match some field
    #[default]
    And,
    /// Any query term suffices
    Or,
}

impl fmt::Display for CombineWith {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombineWith::And => write!(f, "and"),
            CombineWith::Or => write!(f, "or"),
        }
    }
}

impl FromStr for CombineWith {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(CombineWith::And),
            "or" => Ok(CombineWith::Or),
            _ => Err(QuarryError::Config {
                reason: format!("unknown combine mode: {}", s),
            }),
        }
    }
}

/// Per-field boost weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub basename: f64,
    pub aliases: f64,
    pub folder: f64,
    pub content: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        FieldWeights {
            basename: 3.0,
            aliases: 3.0,
            folder: 2.0,
            content: 1.0,
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Match case exactly, both in the index and when highlighting lines
    pub case_sensitive: bool,

    /// Default for prefix matching (overridable with `/ap` and `/np`)
    pub prefix_match: bool,

    /// Default for fuzzy matching (overridable with `/af` and `/nf`)
    pub fuzzy_match: bool,

    /// Default combine mode for file search
    pub combine_with: CombineWith,

    /// Maximum number of file results returned by a search
    pub max_results: usize,

    /// Allowed edit distance as a fraction of the term length
    pub fuzzy_proportion: f64,

    /// Shortest term (in chars) that may be prefix matched
    pub min_prefix_length: usize,

    /// Field boosts
    pub weights: FieldWeights,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            case_sensitive: false,
            prefix_match: true,
            fuzzy_match: false,
            combine_with: CombineWith::And,
            max_results: 50,
            fuzzy_proportion: 0.2,
            min_prefix_length: 2,
            weights: FieldWeights::default(),
        }
    }
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Route CJK text through the dictionary segmenter
    pub cjk_patch: bool,

    /// Let the segmenter use its hidden Markov model for unknown words
    pub use_hmm: bool,

    /// Documents inserted per chunk during bulk adds
    pub chunk_size: usize,

    /// Pending operations that trigger an automatic flush
    pub flush_threshold: usize,

    /// Minimum time between two automatic flushes
    pub flush_cooldown_ms: u64,

    /// Extensions whose content is indexed; other files are indexed by name
    pub content_extensions: Vec<String>,

    /// Glob patterns (vault-relative) excluded from indexing
    pub exclude: Vec<String>,

    /// Persist a snapshot after reindexing and flushing
    pub save_snapshot: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            cjk_patch: true,
            use_hmm: false,
            chunk_size: 200,
            flush_threshold: 200,
            flush_cooldown_ms: 1000,
            content_extensions: vec!["md".to_string(), "txt".to_string()],
            exclude: vec![".obsidian/**".to_string(), ".trash/**".to_string()],
            save_snapshot: true,
        }
    }
}

/// Kind of excerpt a line is being prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncateType {
    Line,
    Paragraph,
    SubItem,
}

/// Context and character budgets for one excerpt kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncateLimit {
    pub max_pre_lines: usize,
    pub max_post_lines: usize,
    pub max_pre_chars: usize,
    pub max_post_chars: usize,
    /// Context lines shorter than this end a paragraph
    pub boundary_line_min_chars: usize,
}

impl Default for TruncateLimit {
    fn default() -> Self {
        TruncateLimit {
            max_pre_lines: 0,
            max_post_lines: 0,
            max_pre_chars: 20,
            max_post_chars: 80,
            boundary_line_min_chars: 1,
        }
    }
}

impl TruncateLimit {
    fn new(pre_lines: usize, post_lines: usize, pre_chars: usize, post_chars: usize) -> Self {
        TruncateLimit {
            max_pre_lines: pre_lines,
            max_post_lines: post_lines,
            max_pre_chars: pre_chars,
            max_post_chars: post_chars,
            boundary_line_min_chars: 1,
        }
    }
}

/// Limits for every excerpt kind within one script class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncateLimits {
    pub line: TruncateLimit,
    pub paragraph: TruncateLimit,
    pub sub_item: TruncateLimit,
}

impl Default for TruncateLimits {
    fn default() -> Self {
        TruncateLimits {
            line: TruncateLimit::new(0, 0, 20, 80),
            paragraph: TruncateLimit::new(2, 4, 40, 200),
            sub_item: TruncateLimit::new(0, 0, 10, 60),
        }
    }
}

/// Excerpt budgets split by script.
///
/// Wide (CJK) characters carry more information each, so they get smaller
/// character budgets than narrow scripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncateConfig {
    pub narrow: TruncateLimits,
    pub wide: TruncateLimits,
}

impl Default for TruncateConfig {
    fn default() -> Self {
        TruncateConfig {
            narrow: TruncateLimits::default(),
            wide: TruncateLimits {
                line: TruncateLimit::new(0, 0, 10, 40),
                paragraph: TruncateLimit::new(2, 4, 20, 100),
                sub_item: TruncateLimit::new(0, 0, 5, 30),
            },
        }
    }
}

impl TruncateConfig {
    /// Resolve the limit for an excerpt kind and script class.
    pub fn limit(&self, kind: TruncateType, wide: bool) -> &TruncateLimit {
        let limits = if wide { &self.wide } else { &self.narrow };
        match kind {
            TruncateType::Line => &limits.line,
            TruncateType::Paragraph => &limits.paragraph,
            TruncateType::SubItem => &limits.sub_item,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| QuarryError::Config {
            reason: format!("Failed to parse config: {}", e),
        })?;

        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self).map_err(|e| QuarryError::Config {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "quarry").ok_or_else(|| QuarryError::Config {
            reason: "Could not determine config directory".to_string(),
        })?;

        Ok(dirs.config_dir().join("quarry.toml"))
    }

    /// Get the default data directory path.
    pub fn default_data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "quarry").ok_or_else(|| QuarryError::Config {
            reason: "Could not determine data directory".to_string(),
        })?;

        Ok(dirs.data_dir().to_path_buf())
    }

    /// Get the snapshot directory (from config or default).
    pub fn data_dir(&self) -> Result<PathBuf> {
        match self.general.data_path {
            Some(ref path) => Ok(path.clone()),
            None => Self::default_data_dir(),
        }
    }

    /// Compile the exclusion globs, skipping (and logging) invalid ones.
    pub fn exclude_patterns(&self) -> Vec<glob::Pattern> {
        self.index
            .exclude
            .iter()
            .filter_map(|raw| match glob::Pattern::new(raw) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %raw, error = %e, "Ignoring invalid exclude pattern");
                    None
                }
            })
            .collect()
    }

    /// Check if a vault-relative path should be excluded.
    pub fn should_exclude(&self, path: &str) -> bool {
        self.exclude_patterns().iter().any(|p| p.matches(path))
    }

    /// Check if the content of a path should be indexed.
    pub fn is_content_indexable(&self, path: &str) -> bool {
        let Some((_, ext)) = path.rsplit_once('.') else {
            return false;
        };
        self.index
            .content_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Identify every option that changes how text becomes index terms.
    ///
    /// Snapshots built under a different fingerprint are rejected.
    pub fn tokenizer_fingerprint(&self) -> String {
        format!(
            "r{}:cjk={}:hmm={}:case={}",
            TOKENIZER_REVISION,
            self.index.cjk_patch,
            self.index.use_hmm,
            self.search.case_sensitive
        )
    }
}
