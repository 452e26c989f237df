//! Process-wide repair counters.
//!
//! Call sites bump [`METRICS`] without logging; [`Metrics::flush`] emits one
//! `info!` event with a [`MetricsSnapshot`] of every counter.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub static METRICS: Metrics = Metrics::new();

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub sessions_started: u64,
    pub sessions_succeeded: u64,
    pub sessions_escalated: u64,
    pub steps_executed: u64,
    pub retries_consumed: u64,
}

pub struct Metrics {
    sessions_started: AtomicU64,
    sessions_succeeded: AtomicU64,
    sessions_escalated: AtomicU64,
    steps_executed: AtomicU64,
    retries_consumed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            sessions_succeeded: AtomicU64::new(0),
            sessions_escalated: AtomicU64::new(0),
            steps_executed: AtomicU64::new(0),
            retries_consumed: AtomicU64::new(0),
        }
    }

    pub fn inc_sessions_started(&self) {
        bump(&self.sessions_started);
    }

    pub fn inc_sessions_succeeded(&self) {
        bump(&self.sessions_succeeded);
    }

    pub fn inc_sessions_escalated(&self) {
        bump(&self.sessions_escalated);
    }

    pub fn inc_steps_executed(&self) {
        bump(&self.steps_executed);
    }

    pub fn inc_retries_consumed(&self) {
        bump(&self.retries_consumed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_succeeded: self.sessions_succeeded.load(Ordering::Relaxed),
            sessions_escalated: self.sessions_escalated.load(Ordering::Relaxed),
            steps_executed: self.steps_executed.load(Ordering::Relaxed),
            retries_consumed: self.retries_consumed.load(Ordering::Relaxed),
        }
    }

    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            event = "metrics.flush",
            sessions_started = s.sessions_started,
            sessions_succeeded = s.sessions_succeeded,
            sessions_escalated = s.sessions_escalated,
            steps_executed = s.steps_executed,
            retries_consumed = s.retries_consumed,
        );
    }

    pub fn reset(&self) {
        for counter in [
            &self.sessions_started,
            &self.sessions_succeeded,
            &self.sessions_escalated,
            &self.steps_executed,
            &self.retries_consumed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
