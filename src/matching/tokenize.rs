//! Source-text tokenization into candidate match keys.
//! Lowercases, keeps maximal word-character runs (Unicode letters, digits,
//! underscore) of a minimum length, and deduplicates into a sorted set.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

/// Minimum token length (in characters) for the default tokenizer.
pub const DEFAULT_MIN_LEN: usize = 3;

fn word_runs() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\w+").expect("static word pattern"))
}

/// Tokenize with the default minimum length of 3.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    tokenize_min(text, DEFAULT_MIN_LEN)
}

/// Tokenize keeping runs of at least `min_len` characters.
/// Iteration order is lexicographic, so it is stable across runs.
pub fn tokenize_min(text: &str, min_len: usize) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    word_runs()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|run| run.chars().count() >= min_len)
        .map(str::to_string)
        .collect()
}
