//! In-file relevance: picking and highlighting the best lines of a file.
//!
//! The index engine tells us *which* files match; this module answers
//! *where*. Given a file's lines and the terms the engine matched, it scores
//! every line, keeps the best `top_k` with a bounded heap, and computes
//! highlight positions inside a character window around the first hit.
//!
//! All offsets are in chars, not bytes, so highlights stay correct for CJK
//! and other multi-byte text.

use crate::config::{Config, TruncateConfig, TruncateLimit, TruncateType};
use crate::heap::PriorityQueue;
use crate::tokenizer::is_cjk;
use crate::types::{Line, MatchedLine};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::warn;

/// Bonus for every repeated occurrence of a term already counted.
const REPEAT_BONUS: f64 = 0.01;

/// A term compiled for line scanning.
struct TermPattern {
    regex: Regex,
    /// CJK has no word boundaries, so these terms skip the word-end check
    cjk_ending: bool,
    chars: usize,
}

/// One accepted term occurrence, in char offsets.
#[derive(Debug, Clone, Copy)]
struct Occurrence {
    term: usize,
    start: usize,
    len: usize,
}

/// A scored line waiting for top-K selection.
struct Candidate<'a> {
    line: &'a Line,
    occurrences: Vec<Occurrence>,
    score: f64,
}

/// Reduce the engine's terms to the set worth highlighting.
///
/// Keeps query terms the engine actually matched, then drops any term that
/// is contained in another kept term. Falls back to the matched terms when no
/// query term survives (e.g. fuzzy-only hits).
pub fn dedup_terms(query_terms: &[String], matched_terms: &[String]) -> Vec<String> {
    let kept: Vec<&String> = query_terms
        .iter()
        .filter(|term| matched_terms.contains(term))
        .collect();

    let source: Vec<&String> = if kept.is_empty() {
        matched_terms.iter().collect()
    } else {
        kept
    };

    let mut out: Vec<String> = Vec::new();
    for term in &source {
        if term.is_empty() || out.iter().any(|t| t == *term) {
            continue;
        }
        let contained = source
            .iter()
            .any(|other| other.len() > term.len() && other.contains(term.as_str()));
        if !contained {
            out.push((*term).clone());
        }
    }
    out
}

/// Whether `rest` starts with a letter that extends a Latin-script word.
///
/// CJK chars do not count: mixed text like "我用Rust写代码" has no spaces
/// between scripts.
fn continues_word(rest: &str) -> bool {
    rest.chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() && !is_cjk(c))
}

/// Byte offset → char offset table for one line.
fn char_offsets(text: &str) -> Vec<usize> {
    let mut table = vec![0; text.len() + 1];
    let mut chars = 0;
    for (byte, c) in text.char_indices() {
        for slot in &mut table[byte..byte + c.len_utf8()] {
            *slot = chars;
        }
        chars += 1;
    }
    table[text.len()] = chars;
    table
}

/// Selects and highlights the most relevant lines of a file.
#[derive(Debug, Clone)]
pub struct LinesMatcher {
    case_sensitive: bool,
    truncate: TruncateConfig,
}

impl LinesMatcher {
    pub fn new(case_sensitive: bool, truncate: TruncateConfig) -> Self {
        LinesMatcher {
            case_sensitive,
            truncate,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        LinesMatcher::new(config.search.case_sensitive, config.truncate.clone())
    }

    fn compile(&self, terms: &[String]) -> Vec<TermPattern> {
        terms
            .iter()
            .filter_map(|term| {
                let regex = RegexBuilder::new(&regex::escape(term))
                    .case_insensitive(!self.case_sensitive)
                    .build();
                match regex {
                    Ok(regex) => Some(TermPattern {
                        regex,
                        cjk_ending: term.chars().last().is_some_and(is_cjk),
                        chars: term.chars().count(),
                    }),
                    Err(e) => {
                        warn!(term = %term, error = %e, "Skipping unmatchable term");
                        None
                    }
                }
            })
            .collect()
    }

    /// Every accepted occurrence of every term in `text`.
    ///
    /// A rejected occurrence resumes the search one char later, so overlapping
    /// candidates ("ana" in "banana") are still tried.
    fn occurrences(&self, text: &str, patterns: &[TermPattern], prefix: bool) -> Vec<Occurrence> {
        let offsets = char_offsets(text);
        let mut found = Vec::new();

        for (idx, pattern) in patterns.iter().enumerate() {
            let guarded = !prefix && !pattern.cjk_ending;
            let mut at = 0;
            while let Some(m) = pattern.regex.find_at(text, at) {
                if guarded && continues_word(&text[m.end()..]) {
                    at = m.start() + text[m.start()..].chars().next().map_or(1, char::len_utf8);
                    continue;
                }
                let start = offsets[m.start()];
                found.push(Occurrence {
                    term: idx,
                    start,
                    len: offsets[m.end()] - start,
                });
                // Terms are never empty, so this always advances.
                at = m.end();
            }
        }
        found
    }

    fn score(patterns: &[TermPattern], occurrences: &[Occurrence]) -> f64 {
        let mut seen = vec![false; patterns.len()];
        let mut score = 0.0;
        for occurrence in occurrences {
            if seen[occurrence.term] {
                score += REPEAT_BONUS;
            } else {
                seen[occurrence.term] = true;
                score += patterns[occurrence.term].chars as f64;
            }
        }
        score
    }

    /// Anchor and highlight positions for a candidate line.
    fn highlight(
        &self,
        text: &str,
        patterns: &[TermPattern],
        occurrences: &[Occurrence],
        kind: TruncateType,
    ) -> (usize, BTreeSet<usize>) {
        // Right-to-left over terms; the first term with a hit anchors the window.
        let anchor = (0..patterns.len()).rev().find_map(|term| {
            occurrences
                .iter()
                .filter(|o| o.term == term)
                .min_by_key(|o| o.start)
        });
        let Some(anchor) = anchor else {
            return (0, BTreeSet::new());
        };

        let wide = text.chars().any(is_cjk);
        let limit = self.truncate.limit(kind, wide);
        let line_chars = text.chars().count();
        let window_start = anchor.start.saturating_sub(limit.max_pre_chars);
        let window_end = (anchor.start + anchor.len + limit.max_post_chars).min(line_chars);

        let positions = occurrences
            .iter()
            .flat_map(|o| o.start..o.start + o.len)
            .filter(|p| (window_start..window_end).contains(p))
            .collect();

        (anchor.start, positions)
    }

    /// Pick the best `top_k` lines for the given terms, best first.
    ///
    /// In non-prefix mode a term must not be directly followed by a letter,
    /// so "cat" does not hit "category".
    pub fn match_lines(
        &self,
        lines: &[Line],
        query_terms: &[String],
        matched_terms: &[String],
        top_k: usize,
        kind: TruncateType,
        prefix: bool,
    ) -> Vec<MatchedLine> {
        let terms = dedup_terms(query_terms, matched_terms);
        let patterns = self.compile(&terms);
        if patterns.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut best: PriorityQueue<Candidate<'_>, _> = PriorityQueue::new(top_k, |a: &Candidate<'_>, b: &Candidate<'_>| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.line.row.cmp(&a.line.row))
        });

        for line in lines {
            let occurrences = self.occurrences(&line.text, &patterns, prefix);
            if occurrences.is_empty() {
                continue;
            }

            let score = Self::score(&patterns, &occurrences);
            debug_assert!(score > 0.0);
            best.push(Candidate {
                line,
                occurrences,
                score,
            });
        }

        // Only the retained lines are highlighted.
        best.into_sorted_vec()
            .into_iter()
            .map(|candidate| {
                let text = &candidate.line.text;
                let (col, positions) =
                    self.highlight(text, &patterns, &candidate.occurrences, kind);
                MatchedLine {
                    text: text.clone(),
                    row: candidate.line.row,
                    col,
                    positions,
                    score: candidate.score,
                }
            })
            .collect()
    }

    /// Lines around `row` that belong to the same paragraph.
    ///
    /// Extends up to `max_pre_lines` before and `max_post_lines` after the
    /// row, stopping at lines shorter than `boundary_line_min_chars`.
    pub fn context(&self, lines: &[Line], row: usize, limit: &TruncateLimit) -> Vec<Line> {
        let Some(center) = lines.iter().position(|line| line.row == row) else {
            return Vec::new();
        };
        let is_boundary =
            |line: &Line| line.text.trim().chars().count() < limit.boundary_line_min_chars;

        let mut start = center;
        while start > 0 && center - start < limit.max_pre_lines && !is_boundary(&lines[start - 1]) {
            start -= 1;
        }

        let mut end = center;
        while end + 1 < lines.len()
            && end - center < limit.max_post_lines
            && !is_boundary(&lines[end + 1])
        {
            end += 1;
        }

        lines[start..=end].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> LinesMatcher {
        LinesMatcher::new(false, TruncateConfig::default())
    }

    fn lines(texts: &[&str]) -> Vec<Line> {
        texts
            .iter()
            .enumerate()
            .map(|(row, text)| Line::new(*text, row))
            .collect()
    }

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_word_end_guard() {
        let result = matcher().match_lines(
            &lines(&["no match", "has cat", "has category"]),
            &terms(&["cat"]),
            &terms(&["cat"]),
            10,
            TruncateType::Line,
            false,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].row, 1);
        assert_eq!(result[0].col, 4);
        assert_eq!(result[0].positions, BTreeSet::from([4, 5, 6]));
    }

    #[test]
    fn test_prefix_mode_matches_inside_words() {
        let result = matcher().match_lines(
            &lines(&["has cat", "has category"]),
            &terms(&["cat"]),
            &terms(&["cat", "category"]),
            10,
            TruncateType::Line,
            true,
        );
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_cjk_terms_skip_word_end_guard() {
        let result = matcher().match_lines(
            &lines(&["今天搜索引擎很好"]),
            &terms(&["搜索"]),
            &terms(&["搜索"]),
            10,
            TruncateType::Line,
            false,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].positions, BTreeSet::from([2, 3]));
    }

    #[test]
    fn test_latin_term_inside_cjk_text() {
        let result = matcher().match_lines(
            &lines(&["我用Rust写代码"]),
            &terms(&["rust"]),
            &terms(&["rust"]),
            5,
            TruncateType::Line,
            false,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].col, 2);
        assert_eq!(result[0].positions, BTreeSet::from([2, 3, 4, 5]));

        // A Latin letter still ends the match
        assert!(matcher()
            .match_lines(
                &lines(&["我用Rusty写代码"]),
                &terms(&["rust"]),
                &terms(&["rust"]),
                5,
                TruncateType::Line,
                false,
            )
            .is_empty());
    }

    #[test]
    fn test_rejected_occurrence_retries_overlap() {
        let result = matcher().match_lines(
            &lines(&["banana"]),
            &terms(&["ana"]),
            &terms(&["ana"]),
            5,
            TruncateType::Line,
            false,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].col, 3);
        assert_eq!(result[0].positions, BTreeSet::from([3, 4, 5]));
    }

    #[test]
    fn test_only_kept_lines_are_returned_highlighted() {
        let result = matcher().match_lines(
            &lines(&["note", "note note", "nothing", "a note here"]),
            &terms(&["note"]),
            &terms(&["note"]),
            2,
            TruncateType::Line,
            false,
        );
        let rows: Vec<usize> = result.iter().map(|l| l.row).collect();
        assert_eq!(rows, vec![1, 0]);
        assert_eq!(result[0].positions, BTreeSet::from([0, 1, 2, 3, 5, 6, 7, 8]));
        assert_eq!(result[1].positions, BTreeSet::from([0, 1, 2, 3]));
    }

    #[test]
    fn test_scoring_and_order() {
        let result = matcher().match_lines(
            &lines(&["alpha", "alpha beta", "beta beta", "alpha alpha"]),
            &terms(&["alpha", "beta"]),
            &terms(&["alpha", "beta"]),
            10,
            TruncateType::Line,
            false,
        );
        let rows: Vec<usize> = result.iter().map(|l| l.row).collect();
        assert_eq!(rows, vec![1, 3, 0, 2]);
        assert!((result[0].score - 9.0).abs() < 1e-9);
        assert!((result[1].score - 5.01).abs() < 1e-9);
    }

    #[test]
    fn test_top_k_bound() {
        let texts: Vec<String> = (0..50).map(|i| format!("line {} note", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let result = matcher().match_lines(
            &lines(&refs),
            &terms(&["note"]),
            &terms(&["note"]),
            3,
            TruncateType::Line,
            false,
        );
        let rows: Vec<usize> = result.iter().map(|l| l.row).collect();
        assert_eq!(rows, vec![0, 1, 2]);
    }

    #[test]
    fn test_case_sensitivity() {
        let input = lines(&["Rust is great"]);
        let insensitive = matcher().match_lines(
            &input,
            &terms(&["rust"]),
            &terms(&["rust"]),
            5,
            TruncateType::Line,
            false,
        );
        assert_eq!(insensitive.len(), 1);

        let sensitive = LinesMatcher::new(true, TruncateConfig::default()).match_lines(
            &input,
            &terms(&["rust"]),
            &terms(&["rust"]),
            5,
            TruncateType::Line,
            false,
        );
        assert!(sensitive.is_empty());
    }

    #[test]
    fn test_highlight_window_excludes_far_hits() {
        let far = format!("cat {} cat", "x ".repeat(60));
        let result = matcher().match_lines(
            &lines(&[far.as_str()]),
            &terms(&["cat"]),
            &terms(&["cat"]),
            1,
            TruncateType::Line,
            false,
        );
        assert_eq!(result[0].col, 0);
        assert_eq!(result[0].positions, BTreeSet::from([0, 1, 2]));
    }

    #[test]
    fn test_dedup_terms() {
        assert_eq!(
            dedup_terms(&terms(&["foobar", "foo", "bar"]), &terms(&["foo", "foobar", "bar"])),
            terms(&["foobar"])
        );
        assert_eq!(
            dedup_terms(&terms(&["helo"]), &terms(&["hello", "help"])),
            terms(&["hello", "help"])
        );
        assert_eq!(
            dedup_terms(&terms(&["cat", "dog"]), &terms(&["cat"])),
            terms(&["cat"])
        );
    }

    #[test]
    fn test_positions_are_char_offsets() {
        let result = matcher().match_lines(
            &lines(&["héllo wörld"]),
            &terms(&["wörld"]),
            &terms(&["wörld"]),
            1,
            TruncateType::Line,
            false,
        );
        assert_eq!(result[0].col, 6);
        assert_eq!(result[0].positions, BTreeSet::from([6, 7, 8, 9, 10]));
    }

    #[test]
    fn test_context_stops_at_blank_lines() {
        let input = lines(&["intro", "", "first", "second", "third", "fourth", "", "after"]);
        let limit = TruncateLimit {
            max_pre_lines: 2,
            max_post_lines: 4,
            max_pre_chars: 40,
            max_post_chars: 200,
            boundary_line_min_chars: 1,
        };
        let context = matcher().context(&input, 3, &limit);
        let rows: Vec<usize> = context.iter().map(|l| l.row).collect();
        assert_eq!(rows, vec![2, 3, 4, 5]);

        assert!(matcher().context(&input, 99, &limit).is_empty());
    }
}
