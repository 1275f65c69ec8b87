//! TM corpus matcher: sentence-level fallback for tokens the glossary misses.
//! A TM entry qualifies when it is in scope and its source text contains the
//! token (case-insensitive). Among qualifying entries the winner is chosen by
//! a total order, so the result does not depend on row storage order.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::MatchPolicy;
use crate::error::RepositoryError;
use crate::matching::Scope;
use crate::repository::{NewTmEntry, Repository, TmEntry};

/// The winning entry's translation plus the source sentence it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmMatch {
    pub entry_id: i64,
    pub translation: String,
    pub context_sentence: String,
}

/// Ranked order: higher quality, then more uses, then most recently used,
/// then lowest id. `Ordering::Less` means `a` beats `b`.
pub fn ranked_order(a: &TmEntry, b: &TmEntry) -> Ordering {
    b.quality_score
        .cmp(&a.quality_score)
        .then_with(|| b.usage_count.cmp(&a.usage_count))
        .then_with(|| b.last_used.cmp(&a.last_used))
        .then_with(|| a.id.cmp(&b.id))
}

fn first_match_order(a: &TmEntry, b: &TmEntry) -> Ordering {
    a.id.cmp(&b.id)
}

/// Pick the best candidate under `policy`.
pub fn select_best(candidates: Vec<TmEntry>, policy: MatchPolicy) -> Option<TmEntry> {
    let order: fn(&TmEntry, &TmEntry) -> Ordering = match policy {
        MatchPolicy::Ranked => ranked_order,
        MatchPolicy::FirstMatch => first_match_order,
    };
    candidates.into_iter().min_by(order)
}

#[derive(Clone)]
pub struct TmMatcher {
    repo: Arc<dyn Repository>,
    policy: MatchPolicy,
}

impl TmMatcher {
    pub fn new(repo: Arc<dyn Repository>, policy: MatchPolicy) -> Self {
        Self { repo, policy }
    }

    /// Find the best in-scope entry containing `token`. On a hit the winning
    /// row's usage is bumped; no other row is touched. Once `cancel` fires the
    /// lookup reports no match and leaves usage alone.
    pub fn lookup(
        &self,
        token: &str,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> Result<Option<TmMatch>, RepositoryError> {
        let needle = token.to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }
        let candidates = self.repo.tm_candidates(scope, &needle)?;
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let considered = candidates.len();
        let Some(best) = select_best(candidates, self.policy) else {
            return Ok(None);
        };

        self.repo.tm_record_use(best.id, Utc::now())?;
        debug!(
            token,
            entry_id = best.id,
            considered,
            quality = best.quality_score,
            "tm match selected"
        );

        Ok(Some(TmMatch {
            entry_id: best.id,
            translation: best.target_text,
            context_sentence: best.source_text,
        }))
    }

    /// Add a pair to the corpus and return its row id.
    pub fn insert(&self, entry: &NewTmEntry) -> Result<i64, RepositoryError> {
        let id = self.repo.insert_tm_entry(entry)?;
        debug!(entry_id = id, brand_id = %entry.brand_id, "tm entry inserted");
        Ok(id)
    }
}
