//! Script-aware tokenizer.
//!
//! Text is split on whitespace and brackets into segments. Short segments are
//! kept verbatim so exact substrings stay searchable. Segments containing CJK,
//! Kana or Hangul go through a dictionary segmenter (CJK has no spaces between
//! words); everything else is split on punctuation and camel-case boundaries.
//!
//! The segmenter is an injected capability. Until it is initialized the
//! tokenizer degrades to whole-segment tokens and logs the condition once.

use crate::config::Config;
use crate::error::{QuarryError, Result};
use jieba_rs::Jieba;
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Segments shorter than this (in chars) are also indexed verbatim.
const RAW_SEGMENT_MAX_CHARS: usize = 12;

/// Dictionary-based word segmenter for CJK text.
pub trait Segmenter: Send + Sync {
    /// Load dictionaries. Must complete before `cut` succeeds.
    fn init(&self) -> Result<()>;

    /// Whether `init` has completed
    fn is_ready(&self) -> bool;

    /// Split `text` into words.
    ///
    /// Returns `SegmenterUnavailable` if called before `init`.
    fn cut(&self, text: &str, use_hmm: bool) -> Result<Vec<String>>;
}

/// Segmenter backed by jieba's bundled dictionary.
#[derive(Default)]
pub struct JiebaSegmenter {
    jieba: OnceCell<Jieba>,
}

impl JiebaSegmenter {
    pub fn new() -> Self {
        JiebaSegmenter {
            jieba: OnceCell::new(),
        }
    }
}

impl Segmenter for JiebaSegmenter {
    fn init(&self) -> Result<()> {
        self.jieba.get_or_init(|| {
            debug!("Loading jieba dictionary");
            Jieba::new()
        });
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.jieba.get().is_some()
    }

    fn cut(&self, text: &str, use_hmm: bool) -> Result<Vec<String>> {
        let jieba = self.jieba.get().ok_or(QuarryError::SegmenterUnavailable)?;
        Ok(jieba
            .cut(text, use_hmm)
            .into_iter()
            .map(str::to_string)
            .collect())
    }
}

/// Check whether a character belongs to a CJK, Kana or Hangul block.
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{1100}'..='\u{11ff}' |  // Hangul Jamo
        '\u{3040}'..='\u{309f}' |  // Hiragana
        '\u{30a0}'..='\u{30ff}' |  // Katakana
        '\u{3130}'..='\u{318f}' |  // Hangul Compatibility Jamo
        '\u{3400}'..='\u{4dbf}' |  // CJK Extension A
        '\u{4e00}'..='\u{9fff}' |  // CJK Unified Ideographs
        '\u{ac00}'..='\u{d7af}' |  // Hangul Syllables
        '\u{f900}'..='\u{faff}' |  // CJK Compatibility Ideographs
        '\u{20000}'..='\u{2a6df}'  // CJK Extension B
    )
}

fn is_segment_separator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>'
                | '（' | '）' | '【' | '】' | '「' | '」' | '『' | '』' | '《' | '》' | '〈' | '〉'
        )
}

/// A token worth indexing: not a lone non-CJK character, not pure punctuation.
fn is_meaningful(word: &str) -> bool {
    let mut chars = word.chars();
    match (chars.next(), chars.next()) {
        (None, _) => false,
        (Some(c), None) => is_cjk(c),
        _ => word.chars().any(char::is_alphanumeric),
    }
}

/// Split a word on camel-case boundaries ("fooBar" → "foo", "Bar";
/// "HTMLParser" → "HTML", "Parser").
fn split_camel_case(word: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = word.char_indices().collect();
    let mut parts = Vec::new();
    let mut start = 0;

    for i in 1..chars.len() {
        let (byte, c) = chars[i];
        let prev = chars[i - 1].1;
        let next_is_lower = chars.get(i + 1).is_some_and(|(_, n)| n.is_lowercase());
        let boundary = c.is_uppercase()
            && (prev.is_lowercase()
                || prev.is_numeric()
                || (prev.is_uppercase() && next_is_lower));
        if boundary {
            parts.push(&word[start..byte]);
            start = byte;
        }
    }
    parts.push(&word[start..]);
    parts
}

/// Turns text into a set of index terms.
pub struct Tokenizer {
    segmenter: Option<Arc<dyn Segmenter>>,
    cjk_patch: bool,
    use_hmm: bool,
    warned_unavailable: AtomicBool,
}

impl Tokenizer {
    pub fn new(segmenter: Option<Arc<dyn Segmenter>>, cjk_patch: bool, use_hmm: bool) -> Self {
        Tokenizer {
            segmenter,
            cjk_patch,
            use_hmm,
            warned_unavailable: AtomicBool::new(false),
        }
    }

    /// Build a tokenizer using the `[index]` options of `config`.
    pub fn from_config(config: &Config, segmenter: Option<Arc<dyn Segmenter>>) -> Self {
        Tokenizer::new(segmenter, config.index.cjk_patch, config.index.use_hmm)
    }

    /// Tokenize `text`. Order is irrelevant and duplicates are removed.
    pub fn tokenize(&self, text: &str) -> BTreeSet<String> {
        let mut tokens = BTreeSet::new();

        for segment in text.split(is_segment_separator) {
            let segment = segment.trim_matches(|c: char| !c.is_alphanumeric());
            if segment.is_empty() {
                continue;
            }

            if segment.chars().count() < RAW_SEGMENT_MAX_CHARS && is_meaningful(segment) {
                tokens.insert(segment.to_string());
            }

            if self.cjk_patch && segment.chars().any(is_cjk) {
                self.add_segmented(segment, &mut tokens);
            } else {
                add_split_words(segment, &mut tokens);
            }
        }

        tokens
    }

    fn add_segmented(&self, segment: &str, tokens: &mut BTreeSet<String>) {
        let words = match self.segmenter {
            Some(ref segmenter) => segmenter.cut(segment, self.use_hmm),
            None => Err(QuarryError::SegmenterUnavailable),
        };

        match words {
            Ok(words) => {
                for word in words {
                    let word = word.trim();
                    if is_meaningful(word) {
                        tokens.insert(word.to_string());
                    }
                }
            }
            Err(e) => {
                if !self.warned_unavailable.swap(true, Ordering::Relaxed) {
                    warn!(error = %e, "CJK segmentation unavailable, indexing whole segments");
                }
                tokens.insert(segment.to_string());
            }
        }
    }
}

fn add_split_words(segment: &str, tokens: &mut BTreeSet<String>) {
    for piece in segment.split(|c: char| !c.is_alphanumeric()) {
        if piece.is_empty() {
            continue;
        }
        for word in split_camel_case(piece) {
            if is_meaningful(word) {
                tokens.insert(word.to_string());
            }
        }
    }
}
