//! Repository collaborator: the relational store that owns glossary terms and
//! translation-memory rows. The matching core reaches it only through the
//! [`Repository`] trait, a handle constructed once at startup and injected
//! into every component.

pub mod memory;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::matching::Scope;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

/// Provenance tag carried by a stored TM pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Machine,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Machine => "machine",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(MatchType::Exact),
            "fuzzy" => Ok(MatchType::Fuzzy),
            "machine" => Ok(MatchType::Machine),
            other => Err(format!("unknown match_type: {other}")),
        }
    }
}

/// A stored bilingual sentence pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TmEntry {
    pub id: i64,
    pub brand_id: Uuid,
    pub source_text: String,
    pub target_text: String,
    pub source_language: String,
    pub target_language: String,
    pub project_id: Option<Uuid>,
    pub asset_id: Option<Uuid>,
    pub market: Option<String>,
    pub domain_context: Option<String>,
    pub match_type: MatchType,
    pub quality_score: i32,
    pub confidence_level: Option<f64>,
    pub usage_count: i64,
    pub last_used: Option<DateTime<Utc>>,
    pub cultural_adaptations: Option<serde_json::Value>,
    pub regulatory_notes: Option<String>,
    pub created_by: Option<Uuid>,
}

/// Insert shape for a TM pair; the repository assigns `id`.
/// Also the body of `POST /translation-memory`, so unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewTmEntry {
    pub brand_id: Uuid,
    pub source_text: String,
    pub target_text: String,
    pub source_language: String,
    pub target_language: String,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub asset_id: Option<Uuid>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub domain_context: Option<String>,
    pub match_type: MatchType,
    pub quality_score: i32,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub usage_count: i64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cultural_adaptations: Option<serde_json::Value>,
    #[serde(default)]
    pub regulatory_notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

impl NewTmEntry {
    /// Minimal pair with neutral scoring fields.
    pub fn new(
        brand_id: Uuid,
        source_text: impl Into<String>,
        target_text: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Self {
        Self {
            brand_id,
            source_text: source_text.into(),
            target_text: target_text.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            project_id: None,
            asset_id: None,
            market: None,
            domain_context: None,
            match_type: MatchType::Machine,
            quality_score: 0,
            confidence_level: None,
            usage_count: 0,
            last_used: None,
            cultural_adaptations: None,
            regulatory_notes: None,
            created_by: None,
        }
    }

    pub fn with_quality(mut self, quality_score: i32) -> Self {
        self.quality_score = quality_score;
        self
    }

    pub fn with_usage(mut self, usage_count: i64, last_used: Option<DateTime<Utc>>) -> Self {
        self.usage_count = usage_count;
        self.last_used = last_used;
        self
    }

    /// Language codes are stored lowercased so that scope comparison is exact.
    pub(crate) fn normalized_target_language(&self) -> String {
        self.target_language.trim().to_lowercase()
    }
}

/// Per-row operations against the backing store. Each call is atomic on its own;
/// none of them holds a connection beyond its return.
pub trait Repository: Send + Sync {
    /// Exact lookup by normalized English term.
    fn glossary_lookup(&self, term_en: &str) -> Result<Option<String>, RepositoryError>;

    /// Insert unless the key already exists. Returns true when a row was written.
    fn glossary_insert_or_ignore(
        &self,
        term_en: &str,
        term_target: &str,
    ) -> Result<bool, RepositoryError>;

    fn glossary_len(&self) -> Result<usize, RepositoryError>;

    /// All entries in `scope` whose lowercased source text contains `token`.
    /// `token` is already lowercase. Order is unspecified.
    fn tm_candidates(&self, scope: &Scope, token: &str) -> Result<Vec<TmEntry>, RepositoryError>;

    /// Bump `usage_count` and set `last_used` on one row.
    fn tm_record_use(&self, id: i64, at: DateTime<Utc>) -> Result<(), RepositoryError>;

    fn insert_tm_entry(&self, entry: &NewTmEntry) -> Result<i64, RepositoryError>;

    fn tm_entry(&self, id: i64) -> Result<Option<TmEntry>, RepositoryError>;
}
