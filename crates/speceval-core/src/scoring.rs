//! Deterministic aspect-coverage scoring.
//!
//! The expected answer is reduced to its bullet and numbered lines
//! ("aspects"). An aspect counts as a hit when any of its content tokens
//! occurs in the candidate answer. Everything here is a pure function of its
//! string inputs.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// English function words that never decide a hit on their own.
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in", "is",
    "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "with",
];

lazy_static! {
    /// `-`, `*`, `+`, `•`, `1.` or `1)` at line start, followed by whitespace.
    static ref ASPECT_MARKER: Regex = Regex::new(r"^\s*(?:[-*+•]|\d+[.)])\s+(.*)$").unwrap();
}

/// Bullet or numbered lines of `expected`, marker stripped, trimmed and
/// lower-cased. Lines without a marker are ignored.
pub fn extract_aspects(expected: &str) -> Vec<String> {
    expected
        .lines()
        .filter_map(|line| ASPECT_MARKER.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_lowercase())
        .filter(|aspect| !aspect.is_empty())
        .collect()
}

/// Splits on anything that is not a Unicode letter or digit and lower-cases.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Tokens of an aspect that may count as evidence. An aspect made only of
/// stopwords keeps all of its tokens.
pub fn content_tokens(aspect: &str) -> BTreeSet<String> {
    let all = tokenize(aspect);
    let content: BTreeSet<String> = all
        .iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .cloned()
        .collect();
    if content.is_empty() {
        all
    } else {
        content
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectScore {
    pub score: f64,
    pub hits: usize,
    pub misses: usize,
    pub expected_aspect_count: usize,
    pub hit_aspects: Vec<String>,
    pub missed_aspects: Vec<String>,
}

impl AspectScore {
    /// Score of a case that produced no answer: every aspect missed.
    pub fn all_missed(expected: &str) -> Self {
        score_answer("", expected)
    }
}

pub fn score_answer(answer: &str, expected: &str) -> AspectScore {
    let aspects = extract_aspects(expected);
    let answer_tokens = tokenize(answer);

    let mut hit_aspects = Vec::new();
    let mut missed_aspects = Vec::new();
    for aspect in aspects {
        let hit = content_tokens(&aspect)
            .iter()
            .any(|t| answer_tokens.contains(t));
        if hit {
            hit_aspects.push(aspect);
        } else {
            missed_aspects.push(aspect);
        }
    }

    let hits = hit_aspects.len();
    let misses = missed_aspects.len();
    let expected_aspect_count = hits + misses;
    let score = if expected_aspect_count == 0 {
        0.0
    } else {
        hits as f64 / expected_aspect_count as f64
    };

    AspectScore {
        score,
        hits,
        misses,
        expected_aspect_count,
        hit_aspects,
        missed_aspects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPECTED: &str = "- uses try/finally\n- logs the exception\nSome prose line";

    #[test]
    fn partial_coverage_scores_half() {
        let s = score_answer("The code uses try/finally but does not log anything.", EXPECTED);
        assert_eq!(s.expected_aspect_count, 2);
        assert_eq!(s.hits, 1);
        assert_eq!(s.misses, 1);
        assert!((s.score - 0.5).abs() < f64::EPSILON);
        assert_eq!(s.hit_aspects, vec!["uses try/finally"]);
        assert_eq!(s.missed_aspects, vec!["logs the exception"]);
    }

    #[test]
    fn empty_answer_misses_everything() {
        let s = score_answer("", EXPECTED);
        assert_eq!(s.hits, 0);
        assert_eq!(s.misses, 2);
        assert_eq!(s.score, 0.0);
        assert_eq!(s, AspectScore::all_missed(EXPECTED));
    }

    #[test]
    fn no_aspect_lines_scores_zero() {
        let s = score_answer("anything at all", "just prose\nmore prose");
        assert_eq!(s.expected_aspect_count, 0);
        assert_eq!(s.hits + s.misses, 0);
        assert_eq!(s.score, 0.0);
    }

    #[test]
    fn recognises_bullet_and_numbered_markers() {
        let expected = "- dash\n* star\n+ plus\n• dot\n1. one\n2) two\n-nospace\n10.x";
        assert_eq!(
            extract_aspects(expected),
            vec!["dash", "star", "plus", "dot", "one", "two"]
        );
    }

    #[test]
    fn aspects_are_lowercased_and_trimmed() {
        assert_eq!(extract_aspects("   -   Close The FILE   "), vec!["close the file"]);
    }

    #[test]
    fn tokenize_splits_on_punctuation_and_folds_case() {
        let t = tokenize("Try/Finally, DON'T  x1");
        let expected: BTreeSet<String> = ["try", "finally", "don", "t", "x1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(t, expected);
    }

    #[test]
    fn non_ascii_aspects_score_as_whole_words() {
        let s = score_answer("Der Bericht erwähnt Größe und 日本語.", "- Größe\n- 日本語");
        assert_eq!(s.hits, 2);
        assert_eq!(s.misses, 0);

        let t = tokenize("GRÖSSE größe 日本語");
        let expected: BTreeSet<String> = ["grösse", "größe", "日本語"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(t, expected);

        // A stray letter must not stand in for an accented word.
        let s = score_answer("e", "- größe");
        assert_eq!(s.hits, 0);
    }

    #[test]
    fn stopword_only_aspect_falls_back_to_all_tokens() {
        let s = score_answer("it is", "- it is");
        assert_eq!(s.hits, 1);
    }

    #[test]
    fn stopwords_alone_do_not_hit() {
        let s = score_answer("the", "- logs the exception");
        assert_eq!(s.hits, 0);
    }

    #[test]
    fn permuting_prose_lines_does_not_change_result() {
        let a = "intro\n- close the file\nmiddle\n- handle errors\noutro";
        let b = "outro\n- close the file\nintro\n- handle errors\nmiddle";
        let answer = "We close it and handle nothing else.";
        assert_eq!(score_answer(answer, a), score_answer(answer, b));
    }

    #[test]
    fn invariants_hold_over_assorted_inputs() {
        let expected_inputs = [
            "",
            "- a",
            "- one\n- two\n- three",
            "1. Alpha\n2. Beta\nprose\n* gamma",
            "• ünïcode ßtuff\n- ascii",
        ];
        let answers = ["", "alpha", "one two three", "ASCII gamma beta", "ünïcode"];
        for expected in expected_inputs {
            for answer in answers {
                let s = score_answer(answer, expected);
                assert_eq!(s.hits + s.misses, s.expected_aspect_count);
                assert!((0.0..=1.0).contains(&s.score));
                assert_eq!(s, score_answer(answer, expected));
            }
        }
    }
}
