//! In-process repository with the same per-row semantics as the SQLite one.
//! The availability switch lets callers simulate an unreachable store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{NewTmEntry, Repository, TmEntry};
use crate::error::RepositoryError;
use crate::matching::Scope;

#[derive(Default)]
struct Tables {
    glossary: HashMap<String, String>,
    tm: Vec<TmEntry>,
    next_id: i64,
}

pub struct MemoryRepository {
    tables: Mutex<Tables>,
    available: AtomicBool,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                next_id: 1,
                ..Tables::default()
            }),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle simulated reachability. While unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RepositoryError::Unavailable("memory repository offline".into()))
        }
    }
}

impl Repository for MemoryRepository {
    fn glossary_lookup(&self, term_en: &str) -> Result<Option<String>, RepositoryError> {
        self.check()?;
        Ok(self.tables.lock().glossary.get(term_en).cloned())
    }

    fn glossary_insert_or_ignore(
        &self,
        term_en: &str,
        term_target: &str,
    ) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut tables = self.tables.lock();
        if tables.glossary.contains_key(term_en) {
            return Ok(false);
        }
        tables
            .glossary
            .insert(term_en.to_string(), term_target.to_string());
        Ok(true)
    }

    fn glossary_len(&self) -> Result<usize, RepositoryError> {
        self.check()?;
        Ok(self.tables.lock().glossary.len())
    }

    fn tm_candidates(&self, scope: &Scope, token: &str) -> Result<Vec<TmEntry>, RepositoryError> {
        self.check()?;
        let tables = self.tables.lock();
        Ok(tables
            .tm
            .iter()
            .filter(|e| scope.admits(&e.target_language, e.brand_id))
            .filter(|e| e.source_text.to_lowercase().contains(token))
            .cloned()
            .collect())
    }

    fn tm_record_use(&self, id: i64, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.check()?;
        let mut tables = self.tables.lock();
        if let Some(entry) = tables.tm.iter_mut().find(|e| e.id == id) {
            entry.usage_count += 1;
            entry.last_used = Some(at);
        }
        Ok(())
    }

    fn insert_tm_entry(&self, entry: &NewTmEntry) -> Result<i64, RepositoryError> {
        self.check()?;
        let mut tables = self.tables.lock();
        let id = tables.next_id;
        tables.next_id += 1;
        tables.tm.push(TmEntry {
            id,
            brand_id: entry.brand_id,
            source_text: entry.source_text.clone(),
            target_text: entry.target_text.clone(),
            source_language: entry.source_language.clone(),
            target_language: entry.normalized_target_language(),
            project_id: entry.project_id,
            asset_id: entry.asset_id,
            market: entry.market.clone(),
            domain_context: entry.domain_context.clone(),
            match_type: entry.match_type,
            quality_score: entry.quality_score,
            confidence_level: entry.confidence_level,
            usage_count: entry.usage_count,
            last_used: entry.last_used,
            cultural_adaptations: entry.cultural_adaptations.clone(),
            regulatory_notes: entry.regulatory_notes.clone(),
            created_by: entry.created_by,
        });
        Ok(id)
    }

    fn tm_entry(&self, id: i64) -> Result<Option<TmEntry>, RepositoryError> {
        self.check()?;
        Ok(self.tables.lock().tm.iter().find(|e| e.id == id).cloned())
    }
}
