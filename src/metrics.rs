//! Service metrics served by `GET /metrics`.
//!
//! Two views: per-operation latency (a ring of recent samples plus lifetime
//! call and failure counts), and counters for how token lookups ended.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Operation names used as metric keys.
pub mod ops {
    pub const COMPOSE: &str = "compose";
    pub const GLOSSARY_LOOKUP: &str = "glossary_lookup";
    pub const TM_LOOKUP: &str = "tm_lookup";
    pub const INGEST_GLOSSARY: &str = "ingest_glossary";
    pub const INGEST_TM: &str = "ingest_tm";
    pub const ANALYZE: &str = "analyze";
}

/// How a lookup ended. The first three are counted per token, the last two
/// once per failed composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    GlossaryHit,
    TmHit,
    Miss,
    Timeout,
    RepositoryError,
}

impl Outcome {
    const ALL: [Outcome; 5] = [
        Outcome::GlossaryHit,
        Outcome::TmHit,
        Outcome::Miss,
        Outcome::Timeout,
        Outcome::RepositoryError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::GlossaryHit => "glossary_hit",
            Outcome::TmHit => "tm_hit",
            Outcome::Miss => "miss",
            Outcome::Timeout => "timeout",
            Outcome::RepositoryError => "repository_error",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

struct OpStats {
    recent_us: Vec<u64>,
    next: usize,
    calls: u64,
    failures: u64,
}

impl OpStats {
    fn new(capacity: usize) -> Self {
        Self {
            recent_us: Vec::with_capacity(capacity),
            next: 0,
            calls: 0,
            failures: 0,
        }
    }

    fn observe(&mut self, elapsed: Duration, ok: bool, capacity: usize) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        if self.recent_us.len() < capacity {
            self.recent_us.push(us);
        } else {
            self.recent_us[self.next] = us;
        }
        self.next = (self.next + 1) % capacity;
        self.calls += 1;
        if !ok {
            self.failures += 1;
        }
    }

    fn summary(&self) -> OperationSummary {
        let mut sorted = self.recent_us.clone();
        sorted.sort_unstable();
        OperationSummary {
            calls: self.calls,
            failures: self.failures,
            p50_us: quantile(&sorted, 0.50),
            p95_us: quantile(&sorted, 0.95),
            p99_us: quantile(&sorted, 0.99),
        }
    }
}

/// Nearest-rank quantile over an ascending slice; 0 when empty.
fn quantile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (q * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Latency percentiles cover the recent ring only; `calls` and `failures`
/// are lifetime totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationSummary {
    pub calls: u64,
    pub failures: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub operations: BTreeMap<&'static str, OperationSummary>,
    pub lookups: BTreeMap<&'static str, u64>,
}

pub struct MetricsRegistry {
    ops: Mutex<HashMap<&'static str, OpStats>>,
    outcomes: [AtomicU64; 5],
    ring_capacity: usize,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(ring_capacity: usize) -> Self {
        Self {
            ops: Mutex::new(HashMap::new()),
            outcomes: Default::default(),
            ring_capacity: ring_capacity.max(1),
        }
    }

    pub fn observe(&self, op: &'static str, elapsed: Duration, ok: bool) {
        let capacity = self.ring_capacity;
        self.ops
            .lock()
            .entry(op)
            .or_insert_with(|| OpStats::new(capacity))
            .observe(elapsed, ok, capacity);
        tracing::trace!(op, elapsed_us = elapsed.as_micros() as u64, ok, "operation observed");
    }

    pub fn count(&self, outcome: Outcome) {
        self.outcomes[outcome.slot()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn outcome_count(&self, outcome: Outcome) -> u64 {
        self.outcomes[outcome.slot()].load(Ordering::Relaxed)
    }

    /// Time a synchronous repository call; an `Err` result counts as a failure.
    pub fn time<T, E>(&self, op: &'static str, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let started = Instant::now();
        let result = f();
        self.observe(op, started.elapsed(), result.is_ok());
        result
    }

    /// Start timing an async operation. See [`OpTimer`].
    pub fn timer(self: &Arc<Self>, op: &'static str) -> OpTimer {
        OpTimer {
            op,
            started: Instant::now(),
            registry: Arc::clone(self),
            finished: false,
        }
    }

    pub fn operation(&self, op: &str) -> Option<OperationSummary> {
        self.ops.lock().get(op).map(OpStats::summary)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let operations = self
            .ops
            .lock()
            .iter()
            .map(|(&op, stats)| (op, stats.summary()))
            .collect();
        let lookups = Outcome::ALL
            .iter()
            .map(|&o| (o.as_str(), self.outcome_count(o)))
            .collect();
        MetricsSnapshot { operations, lookups }
    }
}

/// Times one operation. Dropping it without [`OpTimer::finish`] records a
/// failure, so early `?` returns and abandoned requests are still counted.
pub struct OpTimer {
    op: &'static str,
    started: Instant,
    registry: Arc<MetricsRegistry>,
    finished: bool,
}

impl OpTimer {
    pub fn finish(mut self, ok: bool) {
        self.record(ok);
    }

    fn record(&mut self, ok: bool) {
        if !self.finished {
            self.finished = true;
            self.registry.observe(self.op, self.started.elapsed(), ok);
        }
    }
}

impl Drop for OpTimer {
    fn drop(&mut self) {
        self.record(false);
    }
}
