//! Thread-safe counter engine shared by the queue and the workers.

use crate::model::{Counter, MetricsSnapshot};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free pipeline counters.
///
/// One instance is created at startup and shared (`Arc`) by the ingestion
/// queue and every worker. Increments never block.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    counters: [AtomicU64; Counter::ALL.len()],
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to a counter.
    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    /// Add `n` to a counter.
    pub fn add(&self, counter: Counter, n: u64) {
        self.counters[counter.index()].fetch_add(n, Ordering::Relaxed);
        tracing::trace!(counter = %counter, n, "metric incremented");
    }

    /// Current value of a counter.
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Copy all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_accepted: self.get(Counter::EventsAccepted),
            events_dropped: self.get(Counter::EventsDropped),
            commands_dispatched: self.get(Counter::CommandsDispatched),
            commands_denied: self.get(Counter::CommandsDenied),
            generations_succeeded: self.get(Counter::GenerationsSucceeded),
            generations_failed: self.get(Counter::GenerationsFailed),
            generations_shed_stale: self.get(Counter::GenerationsShedStale),
            taken_at: Some(Utc::now()),
        }
    }

    /// Log the current snapshot at info level.
    pub fn log_snapshot(&self) {
        let s = self.snapshot();
        tracing::info!(
            events_accepted = s.events_accepted,
            events_dropped = s.events_dropped,
            commands_dispatched = s.commands_dispatched,
            commands_denied = s.commands_denied,
            generations_succeeded = s.generations_succeeded,
            generations_failed = s.generations_failed,
            generations_shed_stale = s.generations_shed_stale,
            "Pipeline metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_at_zero() {
        let m = PipelineMetrics::new();
        let snap = m.snapshot();
        for counter in Counter::ALL {
            assert_eq!(snap.get(counter), 0);
        }
        assert!(snap.taken_at.is_some());
    }

    #[test]
    fn incr_and_add() {
        let m = PipelineMetrics::new();
        m.incr(Counter::EventsAccepted);
        m.add(Counter::EventsAccepted, 4);
        m.incr(Counter::GenerationsFailed);
        assert_eq!(m.get(Counter::EventsAccepted), 5);
        assert_eq!(m.snapshot().generations_failed, 1);
        assert_eq!(m.get(Counter::CommandsDenied), 0);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let m = Arc::new(PipelineMetrics::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let m = m.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    m.incr(Counter::CommandsDispatched);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(m.get(Counter::CommandsDispatched), 8000);
    }
}
