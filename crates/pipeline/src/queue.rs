//! Ingestion queue: bounded buffer between the platform read loop and the
//! workers.
//!
//! `enqueue` never blocks: when the buffer is full the configured
//! [`ShedPolicy`] decides which event goes, and the loss is counted.
//! `dequeue` parks a worker until an item arrives or the queue is closed.
//!
//! Ordering: items leave in the order they were accepted, and every accepted
//! event carries a strictly increasing sequence number, so per-channel order
//! can always be reconstructed by a consumer that wants it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use streamchat_config::ShedPolicy;
use streamchat_core::ChatEvent;
use streamchat_telemetry::{Counter, PipelineMetrics};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// A buffered event plus the moment it was accepted.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub event: ChatEvent,
    pub enqueued_at: Instant,
}

impl QueueItem {
    /// Time spent since the event was accepted.
    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

/// Result of offering an event to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Buffered with this sequence number.
    Accepted { sequence: u64 },
    /// Buffered, and the oldest item was shed to make room.
    AcceptedEvictingOldest { sequence: u64, evicted: u64 },
    /// Queue full under `reject_newest`.
    Rejected,
    /// Queue already closed.
    Closed,
}

impl EnqueueOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            Self::Accepted { .. } | Self::AcceptedEvictingOldest { .. }
        )
    }

    /// Sequence number assigned to the new event, if it was accepted.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            Self::Accepted { sequence } | Self::AcceptedEvictingOldest { sequence, .. } => {
                Some(*sequence)
            }
            Self::Rejected | Self::Closed => None,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<QueueItem>,
    next_sequence: u64,
    closed: bool,
}

/// Bounded multi-producer, multi-consumer event buffer.
pub struct IngestionQueue {
    state: Mutex<QueueState>,
    available: Notify,
    capacity: usize,
    policy: ShedPolicy,
    metrics: Arc<PipelineMetrics>,
}

impl IngestionQueue {
    /// Create a queue. `capacity` is clamped to at least 1.
    pub fn new(capacity: usize, policy: ShedPolicy, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.max(1)),
                next_sequence: 1,
                closed: false,
            }),
            available: Notify::new(),
            capacity: capacity.max(1),
            policy,
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer an event without blocking. Stamps the sequence number on accept.
    pub fn enqueue(&self, mut event: ChatEvent) -> EnqueueOutcome {
        let outcome = {
            let mut state = self.lock();

            if state.closed {
                self.metrics.incr(Counter::EventsDropped);
                return EnqueueOutcome::Closed;
            }

            let mut evicted = None;
            if state.items.len() >= self.capacity {
                match self.policy {
                    ShedPolicy::RejectNewest => {
                        self.metrics.incr(Counter::EventsDropped);
                        debug!(channel = %event.channel, "Queue full, rejecting newest event");
                        return EnqueueOutcome::Rejected;
                    }
                    ShedPolicy::DropOldest => {
                        if let Some(old) = state.items.pop_front() {
                            self.metrics.incr(Counter::EventsDropped);
                            debug!(
                                channel = %old.event.channel,
                                sequence = old.event.sequence,
                                "Queue full, shed oldest event"
                            );
                            evicted = Some(old.event.sequence);
                        }
                    }
                }
            }

            let sequence = state.next_sequence;
            state.next_sequence += 1;
            event.sequence = sequence;
            state.items.push_back(QueueItem {
                event,
                enqueued_at: Instant::now(),
            });
            self.metrics.incr(Counter::EventsAccepted);

            match evicted {
                Some(evicted) => EnqueueOutcome::AcceptedEvictingOldest { sequence, evicted },
                None => EnqueueOutcome::Accepted { sequence },
            }
        };

        self.available.notify_one();
        outcome
    }

    /// Wait for the next item. Returns `None` once the queue is closed and
    /// drained.
    pub async fn dequeue(&self) -> Option<QueueItem> {
        self.dequeue_with(|item| item).await
    }

    /// Like [`IngestionQueue::dequeue`], but hands the item to `claim` while
    /// the queue is still locked. Whatever `claim` records therefore happens
    /// in acceptance order across all consumers. `claim` must not block and
    /// must not touch this queue.
    pub async fn dequeue_with<R>(&self, mut claim: impl FnMut(QueueItem) -> R) -> Option<R> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register interest before looking, so a push between the check
            // and the await is not missed.
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    if !state.items.is_empty() {
                        // Let another idle worker pick up the rest.
                        self.available.notify_one();
                    }
                    return Some(claim(item));
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Take the next item if one is buffered.
    pub fn try_dequeue(&self) -> Option<QueueItem> {
        self.lock().items.pop_front()
    }

    /// Stop accepting events and wake every parked worker. Buffered items can
    /// still be dequeued.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> ShedPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize, policy: ShedPolicy) -> (IngestionQueue, Arc<PipelineMetrics>) {
        let metrics = Arc::new(PipelineMetrics::new());
        (IngestionQueue::new(capacity, policy, metrics.clone()), metrics)
    }

    fn ev(text: &str) -> ChatEvent {
        ChatEvent::message("#chan", "alice", text)
    }

    fn drain(q: &IngestionQueue) -> Vec<String> {
        std::iter::from_fn(|| q.try_dequeue())
            .map(|i| i.event.text)
            .collect()
    }

    #[test]
    fn drop_oldest_keeps_newest_three() {
        let (q, metrics) = queue(3, ShedPolicy::DropOldest);
        for i in 1..=5 {
            assert!(q.enqueue(ev(&format!("E{i}"))).is_accepted());
        }
        assert_eq!(drain(&q), vec!["E3", "E4", "E5"]);
        assert_eq!(metrics.get(Counter::EventsAccepted), 5);
        assert_eq!(metrics.get(Counter::EventsDropped), 2);
    }

    #[test]
    fn reject_newest_keeps_first_three() {
        let (q, metrics) = queue(3, ShedPolicy::RejectNewest);
        let outcomes: Vec<_> = (1..=5).map(|i| q.enqueue(ev(&format!("E{i}")))).collect();
        assert!(outcomes[..3].iter().all(EnqueueOutcome::is_accepted));
        assert_eq!(outcomes[3], EnqueueOutcome::Rejected);
        assert_eq!(outcomes[4], EnqueueOutcome::Rejected);
        assert_eq!(drain(&q), vec!["E1", "E2", "E3"]);
        assert_eq!(metrics.get(Counter::EventsAccepted), 3);
        assert_eq!(metrics.get(Counter::EventsDropped), 2);
    }

    #[test]
    fn eviction_reports_the_shed_sequence() {
        let (q, _) = queue(1, ShedPolicy::DropOldest);
        let first = q.enqueue(ev("a"));
        let second = q.enqueue(ev("b"));
        assert_eq!(first, EnqueueOutcome::Accepted { sequence: 1 });
        assert_eq!(
            second,
            EnqueueOutcome::AcceptedEvictingOldest {
                sequence: 2,
                evicted: 1
            }
        );
    }

    #[test]
    fn sequences_increase_in_acceptance_order() {
        let (q, _) = queue(10, ShedPolicy::DropOldest);
        for i in 0..4 {
            q.enqueue(ev(&i.to_string()));
        }
        let seqs: Vec<u64> = std::iter::from_fn(|| q.try_dequeue())
            .map(|i| i.event.sequence)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }

    #[test]
    fn closed_queue_refuses_and_counts() {
        let (q, metrics) = queue(3, ShedPolicy::DropOldest);
        q.close();
        assert_eq!(q.enqueue(ev("late")), EnqueueOutcome::Closed);
        assert_eq!(metrics.get(Counter::EventsDropped), 1);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn dequeue_waits_for_enqueue() {
        let metrics = Arc::new(PipelineMetrics::new());
        let q = Arc::new(IngestionQueue::new(4, ShedPolicy::DropOldest, metrics));

        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.dequeue().await })
        };
        tokio::task::yield_now().await;
        q.enqueue(ev("hello"));

        let item = consumer.await.unwrap().unwrap();
        assert_eq!(item.event.text, "hello");
        assert_eq!(item.event.sequence, 1);
    }

    #[tokio::test]
    async fn close_wakes_parked_workers() {
        let metrics = Arc::new(PipelineMetrics::new());
        let q = Arc::new(IngestionQueue::new(4, ShedPolicy::DropOldest, metrics));

        let workers: Vec<_> = (0..3)
            .map(|_| {
                let q = q.clone();
                tokio::spawn(async move { q.dequeue().await })
            })
            .collect();
        tokio::task::yield_now().await;
        q.close();

        for w in workers {
            assert!(w.await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn close_still_drains_buffered_items() {
        let (q, _) = queue(4, ShedPolicy::DropOldest);
        q.enqueue(ev("one"));
        q.enqueue(ev("two"));
        q.close();
        assert_eq!(q.dequeue().await.unwrap().event.text, "one");
        assert_eq!(q.dequeue().await.unwrap().event.text, "two");
        assert!(q.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn claims_run_in_acceptance_order() {
        let (q, _) = queue(8, ShedPolicy::DropOldest);
        for i in 1..=3 {
            q.enqueue(ev(&format!("E{i}")));
        }
        let claimed = Mutex::new(Vec::new());
        for _ in 0..3 {
            q.dequeue_with(|item| claimed.lock().unwrap().push(item.event.sequence))
                .await
                .unwrap();
        }
        assert_eq!(*claimed.lock().unwrap(), vec![1, 2, 3]);
        q.close();
        assert!(q.dequeue_with(|_| ()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn item_age_tracks_clock() {
        let (q, _) = queue(4, ShedPolicy::DropOldest);
        q.enqueue(ev("x"));
        tokio::time::advance(Duration::from_secs(3)).await;
        let item = q.dequeue().await.unwrap();
        assert!(item.age() >= Duration::from_secs(3));
    }
}
