//! Leverage statistics for a translated segment.
//! Glossary-resolved tokens count as exact, TM-resolved tokens as fuzzy,
//! everything else as new. The percentage is derived from the counts, so
//! `exact + fuzzy + new == total` always holds.

use std::collections::HashMap;

use serde::Serialize;

use super::HintSource;

/// The four leverage columns of a TM-intelligence record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LeverageStats {
    pub exact_match_words: u32,
    pub fuzzy_match_words: u32,
    pub new_words: u32,
    pub leverage_percentage: f64,
}

impl LeverageStats {
    /// Classify every token in `segment_tokens` (duplicates counted each time).
    pub fn compute<S: AsRef<str>>(
        segment_tokens: &[S],
        resolved: &HashMap<String, HintSource>,
    ) -> Self {
        let mut stats = LeverageStats::default();
        for token in segment_tokens {
            match resolved.get(token.as_ref()) {
                Some(HintSource::Glossary) => stats.exact_match_words += 1,
                Some(HintSource::TranslationMemory) => stats.fuzzy_match_words += 1,
                None => stats.new_words += 1,
            }
        }
        stats.leverage_percentage = percentage(
            stats.exact_match_words + stats.fuzzy_match_words,
            stats.total_words(),
        );
        stats
    }

    pub fn total_words(&self) -> u32 {
        self.exact_match_words + self.fuzzy_match_words + self.new_words
    }
}

/// `100 * leveraged / total`, or 0 for an empty segment.
fn percentage(leveraged: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * f64::from(leveraged) / f64::from(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(pairs: &[(&str, HintSource)]) -> HashMap<String, HintSource> {
        pairs.iter().map(|(t, s)| (t.to_string(), *s)).collect()
    }

    #[test]
    fn classifies_each_token() {
        let map = resolved(&[
            ("dose", HintSource::Glossary),
            ("tablet", HintSource::TranslationMemory),
        ]);
        let stats = LeverageStats::compute(&["dose", "tablet", "daily", "water"], &map);
        assert_eq!(stats.exact_match_words, 1);
        assert_eq!(stats.fuzzy_match_words, 1);
        assert_eq!(stats.new_words, 2);
        assert_eq!(stats.leverage_percentage, 50.0);
    }

    #[test]
    fn empty_segment_is_zero_percent() {
        let stats = LeverageStats::compute::<&str>(&[], &HashMap::new());
        assert_eq!(stats, LeverageStats::default());
        assert_eq!(stats.leverage_percentage, 0.0);
    }

    #[test]
    fn duplicates_are_counted_per_occurrence() {
        let map = resolved(&[("dose", HintSource::Glossary)]);
        let stats = LeverageStats::compute(&["dose", "dose", "new"], &map);
        assert_eq!(stats.exact_match_words, 2);
        assert_eq!(stats.total_words(), 3);
        assert_eq!(stats.leverage_percentage, 100.0 * 2.0 / 3.0);
    }

    #[test]
    fn counts_always_sum_to_total() {
        let map = resolved(&[
            ("a1", HintSource::Glossary),
            ("b2", HintSource::TranslationMemory),
        ]);
        let vocab = ["a1", "b2", "c3", "d4"];
        for len in 0..20usize {
            let tokens: Vec<&str> = (0..len).map(|i| vocab[(i * 7 + len) % vocab.len()]).collect();
            let stats = LeverageStats::compute(&tokens, &map);
            assert_eq!(stats.total_words() as usize, tokens.len());
            let expected = if tokens.is_empty() {
                0.0
            } else {
                100.0 * f64::from(stats.exact_match_words + stats.fuzzy_match_words)
                    / tokens.len() as f64
            };
            assert_eq!(stats.leverage_percentage, expected);
        }
    }
}
