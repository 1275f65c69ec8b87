//! Glossary index: authoritative term-level translations.
//! Keys are normalized English terms (trimmed, lowercased); lookup is an exact
//! match on the normalized key. Ingestion is insert-or-skip, so replaying a
//! payload leaves the index unchanged and the first stored value wins.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::RepositoryError;
use crate::repository::Repository;

/// One bulk-sync item as exported by the glossary tooling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlossaryPair {
    pub en: String,
    pub target: String,
}

impl GlossaryPair {
    pub fn new(en: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            target: target.into(),
        }
    }
}

/// Outcome of a bulk ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Entries attempted; this is the count reported to bulk-sync callers.
    pub processed: usize,
    /// Entries that created a new key.
    pub inserted: usize,
}

/// Normalize an English term into its glossary key.
pub fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase()
}

#[derive(Clone)]
pub struct GlossaryIndex {
    repo: Arc<dyn Repository>,
}

impl GlossaryIndex {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Case-insensitive exact lookup. Blank terms never match.
    pub fn lookup(&self, term: &str) -> Result<Option<String>, RepositoryError> {
        let key = normalize_term(term);
        if key.is_empty() {
            return Ok(None);
        }
        self.repo.glossary_lookup(&key)
    }

    /// Insert every pair whose normalized key is not yet present.
    /// Pairs with a blank English term are counted as processed but not stored.
    pub fn ingest_bulk(&self, entries: &[GlossaryPair]) -> Result<IngestReport, RepositoryError> {
        let mut report = IngestReport::default();
        for pair in entries {
            report.processed += 1;
            let key = normalize_term(&pair.en);
            if key.is_empty() {
                warn!(target_text = %pair.target, "skipping glossary entry with blank term");
                continue;
            }
            if self.repo.glossary_insert_or_ignore(&key, pair.target.trim())? {
                report.inserted += 1;
            } else {
                debug!(term = %key, "glossary term already present, skipped");
            }
        }
        info!(
            processed = report.processed,
            inserted = report.inserted,
            "glossary bulk ingest"
        );
        Ok(report)
    }

    pub fn len(&self) -> Result<usize, RepositoryError> {
        self.repo.glossary_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;

    fn index() -> GlossaryIndex {
        GlossaryIndex::new(Arc::new(MemoryRepository::new()))
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let idx = index();
        idx.ingest_bulk(&[GlossaryPair::new("Tablet", "Comprimido")]).unwrap();
        assert_eq!(idx.lookup("tablet").unwrap().as_deref(), Some("Comprimido"));
        assert_eq!(idx.lookup("  TABLET ").unwrap().as_deref(), Some("Comprimido"));
        assert_eq!(idx.lookup("tablets").unwrap(), None);
    }

    #[test]
    fn normalized_duplicate_is_skipped() {
        let idx = index();
        let report = idx
            .ingest_bulk(&[GlossaryPair::new("Go", "Po"), GlossaryPair::new("go", "ZZ")])
            .unwrap();
        assert_eq!(report, IngestReport { processed: 2, inserted: 1 });
        assert_eq!(idx.lookup("go").unwrap().as_deref(), Some("Po"));
    }

    #[test]
    fn replaying_a_payload_is_idempotent() {
        let idx = index();
        let payload = vec![
            GlossaryPair::new(" Dose ", " Dosis "),
            GlossaryPair::new("Vial", "Frasco"),
        ];
        for _ in 0..3 {
            let report = idx.ingest_bulk(&payload).unwrap();
            assert_eq!(report.processed, 2);
        }
        assert_eq!(idx.len().unwrap(), 2);
        assert_eq!(idx.lookup("dose").unwrap().as_deref(), Some("Dosis"));
    }

    #[test]
    fn new_target_does_not_overwrite() {
        let idx = index();
        idx.ingest_bulk(&[GlossaryPair::new("vial", "Frasco")]).unwrap();
        idx.ingest_bulk(&[GlossaryPair::new("VIAL", "Ampolla")]).unwrap();
        assert_eq!(idx.lookup("vial").unwrap().as_deref(), Some("Frasco"));
    }

    #[test]
    fn blank_terms_are_counted_but_not_stored() {
        let idx = index();
        let report = idx.ingest_bulk(&[GlossaryPair::new("   ", "x")]).unwrap();
        assert_eq!(report, IngestReport { processed: 1, inserted: 0 });
        assert_eq!(idx.len().unwrap(), 0);
        assert_eq!(idx.lookup("").unwrap(), None);
    }
}
