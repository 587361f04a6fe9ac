use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::Mutex;

use graphflow_primitives::{DateTime, Utc};

const HEALTH_WINDOW: usize = 100;
const UNHEALTHY_ERROR_RATE_PCT: u64 = 10;

/// §3 QueryStats. Counters are relaxed atomics per §5 ("QueryStats counters
/// are updated with relaxed atomics — exact values are not guaranteed in the
/// presence of concurrent queries but monotonic progress is").
#[derive(Debug, Default)]
pub struct QueryStats {
    events_processed: AtomicU64,
    results_added: AtomicU64,
    results_updated: AtomicU64,
    results_deleted: AtomicU64,
    error_count: AtomicU64,
    dropped_count: AtomicU64,
    total_processing_micros: AtomicU64,
    last_processed_micros: AtomicI64,
    /// Ring buffer of the last `HEALTH_WINDOW` per-event outcomes (`true` =
    /// errored), used by `is_healthy` (§7). Non-authoritative diagnostics
    /// like this are the one place a `Mutex` is worth it over an atomic —
    /// the ring buffer itself is tiny and rarely contended.
    health_window: Mutex<HealthWindow>,
    last_scan_strategy: Mutex<Option<String>>,
}

#[derive(Debug, Default)]
struct HealthWindow {
    outcomes: std::collections::VecDeque<bool>,
    errors: u64,
}

impl HealthWindow {
    fn record(&mut self, errored: bool) {
        if self.outcomes.len() == HEALTH_WINDOW {
            if self.outcomes.pop_front() == Some(true) {
                self.errors -= 1;
            }
        }
        self.outcomes.push_back(errored);
        if errored {
            self.errors += 1;
        }
    }
}

impl QueryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self, processing_micros: u64, errored: bool, now: DateTime<Utc>) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_micros.fetch_add(processing_micros, Ordering::Relaxed);
        self.last_processed_micros.store(now.timestamp_micros(), Ordering::Relaxed);
        if errored {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.health_window.lock().record(errored);
    }

    pub fn record_added(&self) {
        self.results_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_updated(&self) {
        self.results_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deleted(&self) {
        self.results_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_strategy(&self, strategy: impl Into<String>) {
        *self.last_scan_strategy.lock() = Some(strategy.into());
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    pub fn results_added(&self) -> u64 {
        self.results_added.load(Ordering::Relaxed)
    }

    pub fn results_updated(&self) -> u64 {
        self.results_updated.load(Ordering::Relaxed)
    }

    pub fn results_deleted(&self) -> u64 {
        self.results_deleted.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn average_processing_micros(&self) -> f64 {
        let events = self.events_processed();
        if events == 0 {
            return 0.0;
        }
        self.total_processing_micros.load(Ordering::Relaxed) as f64 / events as f64
    }

    pub fn last_processed(&self) -> Option<DateTime<Utc>> {
        let micros = self.last_processed_micros.load(Ordering::Relaxed);
        if micros == 0 {
            None
        } else {
            DateTime::from_timestamp_micros(micros)
        }
    }

    /// §7: "the per-query health probe returns unhealthy when error-rate >
    /// 10% over the last 100 events (a conservative threshold, matching
    /// source behavior)".
    pub fn is_healthy(&self) -> bool {
        let window = self.health_window.lock();
        if window.outcomes.is_empty() {
            return true;
        }
        let rate = window.errors * 100 / window.outcomes.len() as u64;
        rate <= UNHEALTHY_ERROR_RATE_PCT
    }

    /// The non-authoritative scan-strategy hint recorded by the evaluator
    /// for diagnostics (§11 "Scan-strategy metrics"); never participates in
    /// a correctness decision.
    pub fn last_scan_strategy(&self) -> Option<String> {
        self.last_scan_strategy.lock().clone()
    }

    /// A point-in-time copy of every counter, for the admin surface's
    /// `stats(queryId)` (§4.4) — the live atomics keep moving under
    /// concurrent ingest.
    pub fn snapshot(&self) -> QueryStatsSnapshot {
        QueryStatsSnapshot {
            events_processed: self.events_processed(),
            results_added: self.results_added(),
            results_updated: self.results_updated(),
            results_deleted: self.results_deleted(),
            error_count: self.error_count(),
            dropped_count: self.dropped_count(),
            average_processing_micros: self.average_processing_micros(),
            last_processed: self.last_processed(),
            healthy: self.is_healthy(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryStatsSnapshot {
    pub events_processed: u64,
    pub results_added: u64,
    pub results_updated: u64,
    pub results_deleted: u64,
    pub error_count: u64,
    pub dropped_count: u64,
    pub average_processing_micros: f64,
    pub last_processed: Option<DateTime<Utc>>,
    pub healthy: bool,
}
