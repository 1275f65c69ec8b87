//! Matching core: tokenizer, glossary index, TM corpus matcher, hint composer
//! and leverage calculator, plus the request-scoped types they exchange.

pub mod compose;
pub mod glossary;
pub mod leverage;
pub mod tm;
pub mod tokenize;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MatchError;

pub use compose::{HintComposer, SegmentAnalysis};
pub use glossary::{GlossaryIndex, GlossaryPair, IngestReport};
pub use leverage::LeverageStats;
pub use tm::TmMatcher;

/// Marker prepended to sentence-level TM hints so callers can tell them
/// apart from term-level glossary translations.
pub const CONTEXT_PREFIX: &str = "Context: ";

/// Validated lookup scope. A TM entry is eligible only when both fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    target_language: String,
    brand_id: Uuid,
}

impl Scope {
    /// Validate raw request values. Language codes are trimmed and lowercased
    /// and must look like `es`, `pt-br`, `zh-hant`; brand ids must be UUIDs.
    pub fn parse(target_language: &str, brand_id: &str) -> Result<Self, MatchError> {
        let lang = target_language.trim().to_lowercase();
        if !is_language_code(&lang) {
            return Err(MatchError::InvalidScope(format!(
                "malformed target_language: {target_language:?}"
            )));
        }
        let brand_id = Uuid::parse_str(brand_id.trim()).map_err(|_| {
            MatchError::InvalidScope(format!("malformed brand_id: {brand_id:?}"))
        })?;
        Ok(Self {
            target_language: lang,
            brand_id,
        })
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    pub fn brand_id(&self) -> Uuid {
        self.brand_id
    }

    /// Whether a row stored under (`target_language`, `brand_id`) is in scope.
    pub fn admits(&self, target_language: &str, brand_id: Uuid) -> bool {
        self.brand_id == brand_id && self.target_language == target_language
    }
}

fn is_language_code(code: &str) -> bool {
    let mut parts = code.split('-');
    let primary = parts.next().unwrap_or_default();
    let primary_ok =
        (2..=3).contains(&primary.len()) && primary.bytes().all(|b| b.is_ascii_lowercase());
    primary_ok
        && parts.all(|p| {
            (2..=8).contains(&p.len())
                && p.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        })
}

/// Which corpus resolved a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HintSource {
    Glossary,
    TranslationMemory,
}

/// Result of one token lookup. Lives for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchHint {
    pub token: String,
    pub translation: String,
    pub source: HintSource,
}

impl MatchHint {
    /// Caller-facing string: glossary hits verbatim, TM hits context-tagged.
    pub fn hint_string(&self) -> String {
        match self.source {
            HintSource::Glossary => self.translation.clone(),
            HintSource::TranslationMemory => format!("{CONTEXT_PREFIX}{}", self.translation),
        }
    }
}

/// Token-keyed hints for one request. Tokens without a match are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HintMap {
    hints: BTreeMap<String, MatchHint>,
}

impl HintMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hint: MatchHint) {
        self.hints.insert(hint.token.clone(), hint);
    }

    pub fn get(&self, token: &str) -> Option<&MatchHint> {
        self.hints.get(token)
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchHint> {
        self.hints.values()
    }

    /// Wire shape: `token -> hint_string`.
    pub fn hint_strings(&self) -> BTreeMap<String, String> {
        self.hints
            .iter()
            .map(|(token, hint)| (token.clone(), hint.hint_string()))
            .collect()
    }

    /// Per-token classification consumed by the leverage calculator.
    pub fn resolution(&self) -> HashMap<String, HintSource> {
        self.hints
            .iter()
            .map(|(token, hint)| (token.clone(), hint.source))
            .collect()
    }
}
