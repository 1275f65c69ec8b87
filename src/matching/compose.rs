//! Hint composer: tokenizes a request, resolves every token against the
//! glossary first and the TM corpus second, and merges the results into one
//! token-keyed map.
//!
//! Tokens are independent, so each one is resolved on its own blocking task
//! and the results are joined. The whole join runs under the request
//! deadline; on timeout the shared cancellation token stops lookups that have
//! not started yet, and the partial results are dropped.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::glossary::{GlossaryIndex, GlossaryPair, IngestReport};
use super::leverage::LeverageStats;
use super::tm::TmMatcher;
use super::tokenize::{tokenize, tokenize_min};
use super::{HintMap, HintSource, MatchHint, Scope};
use crate::config::MatchConfig;
use crate::error::{MatchError, RepositoryError};
use crate::metrics::{ops, MetricsRegistry, Outcome};
use crate::repository::{NewTmEntry, Repository};

/// Hints plus leverage for one segment.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentAnalysis {
    /// Words counted by `leverage`.
    pub tokens: Vec<String>,
    #[serde(skip)]
    pub hints: HintMap,
    pub leverage: LeverageStats,
}

#[derive(Clone)]
pub struct HintComposer {
    glossary: GlossaryIndex,
    tm: TmMatcher,
    config: MatchConfig,
    metrics: Arc<MetricsRegistry>,
}

impl HintComposer {
    pub fn new(
        repo: Arc<dyn Repository>,
        config: MatchConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            glossary: GlossaryIndex::new(Arc::clone(&repo)),
            tm: TmMatcher::new(repo, config.policy),
            config,
            metrics,
        }
    }

    pub fn glossary(&self) -> &GlossaryIndex {
        &self.glossary
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Tokens looked up for a segment, in sorted order. The threshold is the
    /// smaller of the glossary and TM minimums; each source re-checks its own.
    pub fn segment_tokens(&self, text: &str) -> Vec<String> {
        let min_len = self
            .config
            .glossary_min_token_len
            .min(self.config.tm_min_token_len);
        tokenize_min(text, min_len).into_iter().collect()
    }

    /// Compose hints for `text` within (`target_language`, `brand_id`).
    /// The scope is validated before any lookup is issued.
    pub async fn compose(
        &self,
        text: &str,
        target_language: &str,
        brand_id: &str,
    ) -> Result<HintMap, MatchError> {
        let scope = Scope::parse(target_language, brand_id)?;
        let tokens = self.segment_tokens(text);
        self.resolve_all(tokens, &scope).await
    }

    /// Compose hints and compute the leverage statistics of the segment.
    /// Leverage counts the regular tokenization; a shorter word is counted
    /// only when it was resolved.
    pub async fn analyze(
        &self,
        text: &str,
        target_language: &str,
        brand_id: &str,
    ) -> Result<SegmentAnalysis, MatchError> {
        let scope = Scope::parse(target_language, brand_id)?;
        let timer = self.metrics.timer(ops::ANALYZE);
        let hints = self.resolve_all(self.segment_tokens(text), &scope).await?;

        let mut counted = tokenize(text);
        counted.extend(hints.iter().map(|hint| hint.token.clone()));
        let tokens: Vec<String> = counted.into_iter().collect();
        let leverage = LeverageStats::compute(&tokens, &hints.resolution());
        timer.finish(true);

        debug!(
            exact = leverage.exact_match_words,
            fuzzy = leverage.fuzzy_match_words,
            new = leverage.new_words,
            leverage_pct = leverage.leverage_percentage,
            "segment analyzed"
        );
        Ok(SegmentAnalysis {
            tokens,
            hints,
            leverage,
        })
    }

    /// Bulk glossary ingestion on a blocking thread.
    pub async fn ingest_glossary(
        &self,
        pairs: Vec<GlossaryPair>,
    ) -> Result<IngestReport, MatchError> {
        let glossary = self.glossary.clone();
        let timer = self.metrics.timer(ops::INGEST_GLOSSARY);
        let report = tokio::task::spawn_blocking(move || glossary.ingest_bulk(&pairs))
            .await
            .map_err(task_failed)??;
        timer.finish(true);
        Ok(report)
    }

    /// Store one TM pair on a blocking thread. Its target language and brand
    /// must form a valid scope, or the pair could never be matched.
    pub async fn ingest_tm(&self, entry: NewTmEntry) -> Result<i64, MatchError> {
        Scope::parse(&entry.target_language, &entry.brand_id.to_string())?;
        let tm = self.tm.clone();
        let timer = self.metrics.timer(ops::INGEST_TM);
        let id = tokio::task::spawn_blocking(move || tm.insert(&entry))
            .await
            .map_err(task_failed)??;
        timer.finish(true);
        info!(entry_id = id, "tm entry stored");
        Ok(id)
    }

    async fn resolve_all(&self, tokens: Vec<String>, scope: &Scope) -> Result<HintMap, MatchError> {
        let timer = self.metrics.timer(ops::COMPOSE);
        let started = Instant::now();
        let token_count = tokens.len();
        let cancel = CancellationToken::new();

        let lookups = tokens.into_iter().map(|token| {
            let composer = self.clone();
            let scope = scope.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                composer.resolve_token(&token, &scope, &cancel)
            })
        });

        let results = match tokio::time::timeout(self.config.request_timeout, join_all(lookups)).await
        {
            Ok(results) => results,
            Err(_) => {
                cancel.cancel();
                self.metrics.count(Outcome::Timeout);
                let timeout_ms = self.config.request_timeout.as_millis() as u64;
                warn!(timeout_ms, token_count, "hint composition timed out");
                return Err(MatchError::Timeout { timeout_ms });
            }
        };

        let mut hints = HintMap::new();
        for result in results {
            match result.map_err(task_failed).and_then(|lookup| lookup) {
                Ok(Some(hint)) => hints.insert(hint),
                Ok(None) => {}
                Err(e) => {
                    self.metrics.count(Outcome::RepositoryError);
                    return Err(e.into());
                }
            }
        }

        timer.finish(true);
        info!(
            target_language = scope.target_language(),
            brand_id = %scope.brand_id(),
            tokens = token_count,
            hits = hints.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "hints composed"
        );
        Ok(hints)
    }

    /// Glossary first; it is authoritative and short-circuits the TM lookup.
    fn resolve_token(
        &self,
        token: &str,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> Result<Option<MatchHint>, RepositoryError> {
        let len = token.chars().count();

        if len >= self.config.glossary_min_token_len {
            let found = self
                .metrics
                .time(ops::GLOSSARY_LOOKUP, || self.glossary.lookup(token))?;
            if let Some(translation) = found {
                self.metrics.count(Outcome::GlossaryHit);
                return Ok(Some(MatchHint {
                    token: token.to_string(),
                    translation,
                    source: HintSource::Glossary,
                }));
            }
        }

        if len < self.config.tm_min_token_len {
            self.metrics.count(Outcome::Miss);
            return Ok(None);
        }
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let found = self
            .metrics
            .time(ops::TM_LOOKUP, || self.tm.lookup(token, scope, cancel))?;
        match found {
            Some(m) => {
                self.metrics.count(Outcome::TmHit);
                Ok(Some(MatchHint {
                    token: token.to_string(),
                    translation: m.translation,
                    source: HintSource::TranslationMemory,
                }))
            }
            None => {
                if !cancel.is_cancelled() {
                    self.metrics.count(Outcome::Miss);
                }
                Ok(None)
            }
        }
    }
}

fn task_failed(e: tokio::task::JoinError) -> RepositoryError {
    RepositoryError::Unavailable(format!("lookup task failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchPolicy;
    use crate::repository::{MemoryRepository, NewTmEntry};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        metrics: Arc<MetricsRegistry>,
        composer: HintComposer,
        brand: Uuid,
    }

    fn fixture_with(config: MatchConfig) -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let composer = HintComposer::new(repo.clone(), config, Arc::clone(&metrics));
        Fixture {
            repo,
            metrics,
            composer,
            brand: Uuid::new_v4(),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MatchConfig::default())
    }

    impl Fixture {
        fn brand(&self) -> String {
            self.brand.to_string()
        }

        fn glossary(&self, pairs: &[(&str, &str)]) {
            let pairs: Vec<_> = pairs.iter().map(|(e, t)| GlossaryPair::new(*e, *t)).collect();
            self.composer.glossary().ingest_bulk(&pairs).unwrap();
        }

        fn tm(&self, source: &str, target: &str) -> i64 {
            self.repo
                .insert_tm_entry(&NewTmEntry::new(self.brand, source, target, "en", "es"))
                .unwrap()
        }
    }

    #[tokio::test]
    async fn glossary_term_below_tm_threshold_is_found() {
        let fx = fixture();
        fx.glossary(&[("go", "Po")]);
        let hints = fx.composer.compose("Let's go now", "es", &fx.brand()).await.unwrap();
        let expected = BTreeMap::from([("go".to_string(), "Po".to_string())]);
        assert_eq!(hints.hint_strings(), expected);
    }

    #[tokio::test]
    async fn tm_fallback_tags_context_and_bumps_usage() {
        let fx = fixture();
        let id = fx.tm("Kid is jogging", "El niño está corriendo");
        let hints = fx
            .composer
            .compose("the kid jogging today", "es", &fx.brand())
            .await
            .unwrap();

        let strings = hints.hint_strings();
        assert_eq!(strings.len(), 2);
        assert_eq!(strings["kid"], "Context: El niño está corriendo");
        assert_eq!(strings["jogging"], "Context: El niño está corriendo");
        assert_eq!(hints.get("kid").unwrap().source, HintSource::TranslationMemory);
        assert_eq!(fx.repo.tm_entry(id).unwrap().unwrap().usage_count, 2);
    }

    #[tokio::test]
    async fn glossary_wins_over_tm() {
        let fx = fixture();
        fx.glossary(&[("tablet", "Comprimido")]);
        let id = fx.tm("Take one tablet", "Tome un comprimido al día");
        let hints = fx.composer.compose("tablet", "es", &fx.brand()).await.unwrap();
        assert_eq!(hints.hint_strings()["tablet"], "Comprimido");
        assert_eq!(fx.repo.tm_entry(id).unwrap().unwrap().usage_count, 0);
    }

    #[tokio::test]
    async fn short_tokens_never_reach_tm() {
        let fx = fixture();
        let id = fx.tm("go to the clinic", "vaya a la clínica");
        let hints = fx.composer.compose("go", "es", &fx.brand()).await.unwrap();
        assert!(hints.is_empty());
        assert_eq!(fx.repo.tm_entry(id).unwrap().unwrap().usage_count, 0);
    }

    #[tokio::test]
    async fn unknown_scope_yields_empty_map() {
        let fx = fixture();
        fx.tm("Kid is jogging", "El niño está corriendo");
        let other_brand = Uuid::new_v4().to_string();
        let hints = fx.composer.compose("kid jogging", "ja", &other_brand).await.unwrap();
        assert!(hints.is_empty());
    }

    #[tokio::test]
    async fn invalid_scope_is_rejected_before_lookup() {
        let fx = fixture();
        fx.repo.set_available(false);
        let err = fx.composer.compose("kid", "", &fx.brand()).await.unwrap_err();
        assert!(matches!(err, MatchError::InvalidScope(_)));
        let err = fx.composer.compose("kid", "es", "brand-x").await.unwrap_err();
        assert!(matches!(err, MatchError::InvalidScope(_)));
    }

    #[tokio::test]
    async fn unavailable_repository_is_an_error_not_empty() {
        let fx = fixture();
        fx.repo.set_available(false);
        let err = fx.composer.compose("kid jogging", "es", &fx.brand()).await.unwrap_err();
        assert!(matches!(err, MatchError::RepositoryUnavailable(_)));
        assert_eq!(fx.metrics.outcome_count(Outcome::RepositoryError), 1);
        assert_eq!(fx.metrics.operation(ops::COMPOSE).unwrap().failures, 1);
    }

    #[tokio::test]
    async fn empty_text_composes_to_empty_map() {
        let fx = fixture();
        fx.repo.set_available(false);
        let hints = fx.composer.compose("  ", "es", &fx.brand()).await.unwrap();
        assert!(hints.is_empty());
    }

    /// Delegates to a memory repository, sleeping on every glossary lookup.
    struct SlowRepository {
        inner: MemoryRepository,
        delay: Duration,
    }

    impl Repository for SlowRepository {
        fn glossary_lookup(&self, term_en: &str) -> Result<Option<String>, RepositoryError> {
            std::thread::sleep(self.delay);
            self.inner.glossary_lookup(term_en)
        }
        fn glossary_insert_or_ignore(&self, en: &str, target: &str) -> Result<bool, RepositoryError> {
            self.inner.glossary_insert_or_ignore(en, target)
        }
        fn glossary_len(&self) -> Result<usize, RepositoryError> {
            self.inner.glossary_len()
        }
        fn tm_candidates(
            &self,
            scope: &Scope,
            token: &str,
        ) -> Result<Vec<crate::repository::TmEntry>, RepositoryError> {
            self.inner.tm_candidates(scope, token)
        }
        fn tm_record_use(&self, id: i64, at: chrono::DateTime<chrono::Utc>) -> Result<(), RepositoryError> {
            self.inner.tm_record_use(id, at)
        }
        fn insert_tm_entry(&self, entry: &NewTmEntry) -> Result<i64, RepositoryError> {
            self.inner.insert_tm_entry(entry)
        }
        fn tm_entry(&self, id: i64) -> Result<Option<crate::repository::TmEntry>, RepositoryError> {
            self.inner.tm_entry(id)
        }
    }

    #[tokio::test]
    async fn deadline_exceeded_surfaces_timeout() {
        let brand = Uuid::new_v4();
        let inner = MemoryRepository::new();
        let id = inner
            .insert_tm_entry(&NewTmEntry::new(brand, "Kid is jogging", "El niño está corriendo", "en", "es"))
            .unwrap();
        let repo = Arc::new(SlowRepository {
            inner,
            delay: Duration::from_millis(300),
        });
        let metrics = Arc::new(MetricsRegistry::new());
        let composer = HintComposer::new(
            repo.clone(),
            MatchConfig {
                request_timeout: Duration::from_millis(20),
                ..MatchConfig::default()
            },
            Arc::clone(&metrics),
        );

        let err = composer
            .compose("kid jogging", "es", &brand.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::Timeout { timeout_ms: 20 }));
        assert_eq!(metrics.outcome_count(Outcome::Timeout), 1);
        assert_eq!(metrics.operation(ops::COMPOSE).unwrap().failures, 1);

        // lookups still sleeping past the deadline must not touch usage
        tokio::time::sleep(Duration::from_millis(600)).await;
        let entry = repo.tm_entry(id).unwrap().unwrap();
        assert_eq!(entry.usage_count, 0);
        assert_eq!(metrics.outcome_count(Outcome::TmHit), 0);
    }

    #[tokio::test]
    async fn analyze_reports_leverage() {
        let fx = fixture();
        fx.glossary(&[("dose", "dosis")]);
        fx.tm("Take one tablet", "Tome un comprimido");
        let analysis = fx
            .composer
            .analyze("dose tablet daily water", "es", &fx.brand())
            .await
            .unwrap();
        assert_eq!(analysis.tokens, vec!["daily", "dose", "tablet", "water"]);
        assert_eq!(analysis.leverage.exact_match_words, 1);
        assert_eq!(analysis.leverage.fuzzy_match_words, 1);
        assert_eq!(analysis.leverage.new_words, 2);
        assert_eq!(analysis.leverage.leverage_percentage, 50.0);
    }

    #[tokio::test]
    async fn first_match_policy_is_wired_through() {
        let fx = fixture_with(MatchConfig {
            policy: MatchPolicy::FirstMatch,
            ..MatchConfig::default()
        });
        fx.tm("the vial", "primero");
        fx.repo
            .insert_tm_entry(
                &NewTmEntry::new(fx.brand, "vial label", "segundo", "en", "es").with_quality(99),
            )
            .unwrap();
        let hints = fx.composer.compose("vial", "es", &fx.brand()).await.unwrap();
        assert_eq!(hints.hint_strings()["vial"], "Context: primero");
    }

    #[tokio::test]
    async fn ingest_runs_off_the_async_thread() {
        let fx = fixture();
        let report = fx
            .composer
            .ingest_glossary(vec![GlossaryPair::new("Go", "Po"), GlossaryPair::new("go", "ZZ")])
            .await
            .unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(fx.composer.glossary().lookup("go").unwrap().as_deref(), Some("Po"));
    }

    #[tokio::test]
    async fn leverage_skips_short_function_words() {
        let fx = fixture();
        let analysis = fx
            .composer
            .analyze("It is at the lab", "es", &fx.brand())
            .await
            .unwrap();
        assert_eq!(analysis.tokens, vec!["lab", "the"]);
        assert_eq!(analysis.leverage.total_words(), 2);
        assert_eq!(analysis.leverage.new_words, 2);
        assert_eq!(analysis.leverage.leverage_percentage, 0.0);
    }

    #[tokio::test]
    async fn leverage_counts_short_words_the_glossary_resolved() {
        let fx = fixture();
        fx.glossary(&[("at", "en")]);
        let analysis = fx
            .composer
            .analyze("It is at the lab", "es", &fx.brand())
            .await
            .unwrap();
        assert_eq!(analysis.tokens, vec!["at", "lab", "the"]);
        assert_eq!(analysis.leverage.exact_match_words, 1);
        assert_eq!(analysis.leverage.new_words, 2);
        assert_eq!(analysis.hints.hint_strings()["at"], "en");
    }

    #[tokio::test]
    async fn lookup_outcomes_are_counted() {
        let fx = fixture();
        fx.glossary(&[("dose", "dosis")]);
        fx.tm("Take one tablet", "Tome un comprimido");
        fx.composer
            .compose("dose tablet water go", "es", &fx.brand())
            .await
            .unwrap();
        assert_eq!(fx.metrics.outcome_count(Outcome::GlossaryHit), 1);
        assert_eq!(fx.metrics.outcome_count(Outcome::TmHit), 1);
        assert_eq!(fx.metrics.outcome_count(Outcome::Miss), 2);
        assert_eq!(fx.metrics.operation(ops::COMPOSE).unwrap().failures, 0);
    }

    #[tokio::test]
    async fn ingested_tm_entry_becomes_matchable() {
        let fx = fixture();
        let entry = NewTmEntry::new(fx.brand, "Shake well before use", "Agitar bien", "en", "ES");
        let id = fx.composer.ingest_tm(entry).await.unwrap();

        let stored = fx.repo.tm_entry(id).unwrap().unwrap();
        assert_eq!(stored.target_language, "es");
        let hints = fx.composer.compose("shake", "es", &fx.brand()).await.unwrap();
        assert_eq!(hints.hint_strings()["shake"], "Context: Agitar bien");
    }

    #[tokio::test]
    async fn ingest_tm_rejects_unusable_scope() {
        let fx = fixture();
        let entry = NewTmEntry::new(fx.brand, "Shake well", "Agitar", "en", "spanish");
        let err = fx.composer.ingest_tm(entry).await.unwrap_err();
        assert!(matches!(err, MatchError::InvalidScope(_)));
        assert_eq!(fx.metrics.operation(ops::INGEST_TM), None);
    }
}
