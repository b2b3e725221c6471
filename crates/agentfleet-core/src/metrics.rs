//! Process-wide counters for tournament activity.
//!
//! Counters are bumped silently where the work happens; [`Metrics::flush`]
//! emits them as one `tracing::info!` event when a tournament completes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free atomic counters.
pub struct Metrics {
    iterations_run: AtomicU64,
    decisions_recorded: AtomicU64,
    blocking_decisions: AtomicU64,
    evaluator_crashes: AtomicU64,
    tournaments_completed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            iterations_run: AtomicU64::new(0),
            decisions_recorded: AtomicU64::new(0),
            blocking_decisions: AtomicU64::new(0),
            evaluator_crashes: AtomicU64::new(0),
            tournaments_completed: AtomicU64::new(0),
        }
    }

    pub fn inc_iterations(&self) {
        self.iterations_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "iterations_run", "counter incremented");
    }

    /// Count a recorded decision; blocking ones are also counted separately.
    pub fn inc_decisions(&self, blocking: bool) {
        self.decisions_recorded.fetch_add(1, Ordering::Relaxed);
        if blocking {
            self.blocking_decisions.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "decisions_recorded", blocking, "counter incremented");
    }

    pub fn inc_evaluator_crashes(&self) {
        self.evaluator_crashes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluator_crashes", "counter incremented");
    }

    pub fn inc_tournaments(&self) {
        self.tournaments_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            iterations_run = self.iterations_run(),
            decisions_recorded = self.decisions_recorded(),
            blocking_decisions = self.blocking_decisions(),
            evaluator_crashes = self.evaluator_crashes(),
            tournaments_completed = self.tournaments_completed(),
        );
    }

    pub fn iterations_run(&self) -> u64 {
        self.iterations_run.load(Ordering::Relaxed)
    }

    pub fn decisions_recorded(&self) -> u64 {
        self.decisions_recorded.load(Ordering::Relaxed)
    }

    pub fn blocking_decisions(&self) -> u64 {
        self.blocking_decisions.load(Ordering::Relaxed)
    }

    pub fn evaluator_crashes(&self) -> u64 {
        self.evaluator_crashes.load(Ordering::Relaxed)
    }

    pub fn tournaments_completed(&self) -> u64 {
        self.tournaments_completed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.iterations_run.store(0, Ordering::Relaxed);
        self.decisions_recorded.store(0, Ordering::Relaxed);
        self.blocking_decisions.store(0, Ordering::Relaxed);
        self.evaluator_crashes.store(0, Ordering::Relaxed);
        self.tournaments_completed.store(0, Ordering::Relaxed);
    }
}
