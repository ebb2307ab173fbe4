//! Term expansion and ranking for the index engine.
//!
//! Each query term expands to the indexed terms it can match:
//! - itself, if indexed (exact)
//! - every indexed term it is a prefix of, when prefix matching is on and
//!   the term is at least `min_prefix_length` chars
//! - indexed terms within a bounded edit distance, when fuzzy matching is on
//!   and the term is longer than three chars
//!
//! Every expansion hit is scored with a BM25-style formula per field, scaled
//! by the field boost and by how the term was reached. Per-term document
//! sets are then combined with `and` (intersection) or `or` (union).

use crate::config::{CombineWith, FieldWeights, SearchConfig};
use crate::index::IndexData;
use crate::query::QueryOptions;
use crate::types::MatchedFile;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.7;

const EXACT_WEIGHT: f64 = 1.0;
const PREFIX_WEIGHT: f64 = 0.375;
const FUZZY_WEIGHT: f64 = 0.45;

/// Fuzzy matching is skipped for terms this short or shorter.
const FUZZY_MIN_TERM_CHARS: usize = 3;
const FUZZY_MAX_DISTANCE: usize = 6;

/// Options for one engine search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub prefix: bool,
    pub fuzzy: bool,
    pub combine_with: CombineWith,
}

impl SearchOptions {
    pub fn from_config(config: &SearchConfig) -> Self {
        SearchOptions {
            prefix: config.prefix_match,
            fuzzy: config.fuzzy_match,
            combine_with: config.combine_with,
        }
    }

    /// Apply per-query toggles parsed from a command block.
    pub fn with_query(mut self, query: QueryOptions) -> Self {
        self.prefix = query.prefix;
        self.fuzzy = query.fuzzy;
        self
    }

    pub fn with_combine(mut self, combine_with: CombineWith) -> Self {
        self.combine_with = combine_with;
        self
    }
}

/// An indexed document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Basename,
    Aliases,
    Folder,
    Content,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Basename, Field::Aliases, Field::Folder, Field::Content];

    pub(crate) fn slot(self) -> usize {
        match self {
            Field::Basename => 0,
            Field::Aliases => 1,
            Field::Folder => 2,
            Field::Content => 3,
        }
    }

    pub fn weight(self, weights: &FieldWeights) -> f64 {
        match self {
            Field::Basename => weights.basename,
            Field::Aliases => weights.aliases,
            Field::Folder => weights.folder,
            Field::Content => weights.content,
        }
    }
}

/// Edit distance between two strings, counted in chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Maximum edit distance allowed for a term of `term_chars` chars.
pub fn fuzzy_distance(term_chars: usize, proportion: f64) -> usize {
    if term_chars <= FUZZY_MIN_TERM_CHARS {
        return 0;
    }
    ((term_chars as f64 * proportion).round().max(0.0) as usize).min(FUZZY_MAX_DISTANCE)
}

/// An indexed term reached from a query term.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Expansion {
    pub term: String,
    pub weight: f64,
}

/// Keep the strongest way each indexed term was reached.
fn offer<'a>(best: &mut HashMap<&'a str, f64>, indexed: &'a str, weight: f64) {
    let slot = best.entry(indexed).or_insert(0.0);
    if weight > *slot {
        *slot = weight;
    }
}

/// Find every indexed term `term` can match under `options`.
pub(crate) fn expand_term(
    data: &IndexData,
    term: &str,
    options: &SearchOptions,
    config: &SearchConfig,
) -> Vec<Expansion> {
    let mut best: HashMap<&str, f64> = HashMap::new();

    if let Some((indexed, _)) = data.postings.get_key_value(term) {
        offer(&mut best, indexed.as_str(), EXACT_WEIGHT);
    }

    let term_chars = term.chars().count();

    if options.prefix && term_chars >= config.min_prefix_length.max(1) {
        let range = data
            .postings
            .range::<str, _>((Bound::Excluded(term), Bound::Unbounded))
            .take_while(|(indexed, _)| indexed.starts_with(term));
        for (indexed, _) in range {
            offer(&mut best, indexed.as_str(), PREFIX_WEIGHT);
        }
    }

    if options.fuzzy {
        let max_distance = fuzzy_distance(term_chars, config.fuzzy_proportion);
        if max_distance > 0 {
            for indexed in data.postings.keys() {
                if indexed == term {
                    continue;
                }
                let indexed_chars = indexed.chars().count();
                if indexed_chars.abs_diff(term_chars) > max_distance {
                    continue;
                }
                let distance = levenshtein(term, indexed);
                if distance <= max_distance {
                    let scale = 1.0 - distance as f64 / (max_distance as f64 + 1.0);
                    offer(&mut best, indexed.as_str(), FUZZY_WEIGHT * scale);
                }
            }
        }
    }

    let mut expansions: Vec<Expansion> = best
        .into_iter()
        .map(|(term, weight)| Expansion {
            term: term.to_string(),
            weight,
        })
        .collect();
    expansions.sort_by(|a, b| a.term.cmp(&b.term));
    expansions
}

fn idf(documents: usize, doc_freq: usize) -> f64 {
    let n = documents as f64;
    let df = doc_freq as f64;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// BM25 term-frequency component for a single occurrence.
fn saturation(field_len: u32, avg_len: f64) -> f64 {
    let norm = if avg_len > 0.0 {
        1.0 - BM25_B + BM25_B * (field_len as f64 / avg_len)
    } else {
        1.0
    };
    (BM25_K1 + 1.0) / (1.0 + BM25_K1 * norm)
}

#[derive(Debug, Default)]
struct DocHit {
    score: f64,
    query_terms: Vec<String>,
    matched_terms: BTreeSet<String>,
}

impl DocHit {
    fn merge(&mut self, other: DocHit) {
        self.score += other.score;
        self.query_terms.extend(other.query_terms);
        self.matched_terms.extend(other.matched_terms);
    }
}

/// Score one query term against the index, optionally restricted to one document.
fn score_term(
    data: &IndexData,
    query_term: &str,
    options: &SearchOptions,
    config: &SearchConfig,
    only: Option<u32>,
) -> HashMap<u32, DocHit> {
    let mut hits: HashMap<u32, DocHit> = HashMap::new();

    for expansion in expand_term(data, query_term, options, config) {
        let Some(postings) = data.postings.get(&expansion.term) else {
            continue;
        };
        let term_idf = idf(data.live, data.doc_freq(&expansion.term));

        for posting in postings {
            if only.is_some_and(|doc| doc != posting.doc) {
                continue;
            }
            let Some(doc) = data.doc(posting.doc) else {
                continue;
            };

            let field_len = doc.field_lengths[posting.field.slot()];
            let score = expansion.weight
                * posting.field.weight(&config.weights)
                * term_idf
                * saturation(field_len, data.avg_field_len(posting.field));
            debug_assert!(score.is_finite() && score >= 0.0);

            let hit = hits.entry(posting.doc).or_default();
            if hit.query_terms.is_empty() {
                hit.query_terms.push(query_term.to_string());
            }
            hit.score += score;
            hit.matched_terms.insert(expansion.term.clone());
        }
    }

    hits
}

/// Run a search over already-normalized query terms.
pub(crate) fn run(
    data: &IndexData,
    query_terms: &[String],
    options: &SearchOptions,
    config: &SearchConfig,
    only: Option<u32>,
) -> Vec<MatchedFile> {
    let mut combined: Option<HashMap<u32, DocHit>> = None;

    for query_term in query_terms {
        let hits = score_term(data, query_term, options, config, only);
        combined = Some(match combined {
            None => hits,
            Some(mut acc) => match options.combine_with {
                CombineWith::And => {
                    acc.retain(|doc, _| hits.contains_key(doc));
                    for (doc, hit) in hits {
                        if let Some(existing) = acc.get_mut(&doc) {
                            existing.merge(hit);
                        }
                    }
                    acc
                }
                CombineWith::Or => {
                    for (doc, hit) in hits {
                        acc.entry(doc).or_default().merge(hit);
                    }
                    acc
                }
            },
        });
    }

    let mut results: Vec<MatchedFile> = combined
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(doc, hit)| {
            let stored = data.doc(doc)?;
            Some(MatchedFile {
                path: stored.path.clone(),
                query_terms: hit.query_terms,
                matched_terms: hit.matched_terms.into_iter().collect(),
                score: hit.score,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    results.truncate(config.max_results);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("hello", "helo"), 1);
        assert_eq!(levenshtein("中文字", "中字"), 1);
    }

    #[test]
    fn test_fuzzy_distance() {
        assert_eq!(fuzzy_distance(3, 0.2), 0);
        assert_eq!(fuzzy_distance(4, 0.2), 1);
        assert_eq!(fuzzy_distance(10, 0.2), 2);
        assert_eq!(fuzzy_distance(80, 0.5), 6);
    }

    #[test]
    fn test_field_weights() {
        let weights = FieldWeights::default();
        assert!(Field::Basename.weight(&weights) > Field::Folder.weight(&weights));
        assert!(Field::Folder.weight(&weights) > Field::Content.weight(&weights));
        assert_eq!(Field::Aliases.weight(&weights), Field::Basename.weight(&weights));
    }

    #[test]
    fn test_saturation_prefers_short_fields() {
        assert!(saturation(2, 10.0) > saturation(40, 10.0));
        assert!(saturation(5, 0.0).is_finite());
    }

    #[test]
    fn test_idf_rarer_is_higher() {
        assert!(idf(100, 1) > idf(100, 50));
        assert!(idf(1, 1) > 0.0);
    }

    #[test]
    fn test_options_overrides() {
        let options = SearchOptions::from_config(&SearchConfig::default())
            .with_query(QueryOptions {
                prefix: false,
                fuzzy: true,
            })
            .with_combine(CombineWith::Or);
        assert!(!options.prefix);
        assert!(options.fuzzy);
        assert_eq!(options.combine_with, CombineWith::Or);
    }
}
