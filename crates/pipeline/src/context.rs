//! Per-channel conversation history.
//!
//! Each channel gets its own bounded [`ContextWindow`] behind its own lock, so
//! a busy channel never blocks appends or snapshots on another one. The map of
//! windows is a [`DashMap`], sharded internally.
//!
//! Windows are bounded by count and, optionally, by age: with a max age set,
//! entries older than that are pruned on append and left out of snapshots.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use streamchat_core::ContextEntry;
use tokio::time::Instant;
use tracing::debug;

/// Bounded FIFO of context entries for one channel.
#[derive(Debug)]
pub struct ContextWindow {
    capacity: usize,
    max_age: Option<Duration>,
    entries: VecDeque<(Instant, ContextEntry)>,
    last_touched: Instant,
}

impl ContextWindow {
    pub fn new(capacity: usize) -> Self {
        Self::with_max_age(capacity, None)
    }

    pub fn with_max_age(capacity: usize, max_age: Option<Duration>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            max_age,
            entries: VecDeque::with_capacity(capacity),
            last_touched: Instant::now(),
        }
    }

    fn is_expired(&self, added: Instant, now: Instant) -> bool {
        self.max_age
            .is_some_and(|max_age| now.duration_since(added) > max_age)
    }

    /// Append an entry, evicting the oldest when full.
    pub fn push(&mut self, entry: ContextEntry) {
        let now = Instant::now();
        while self
            .entries
            .front()
            .is_some_and(|(added, _)| self.is_expired(*added, now))
        {
            self.entries.pop_front();
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((now, entry));
        self.last_touched = now;
    }

    /// Chronological copy of the current entries.
    pub fn snapshot(&self) -> Vec<ContextEntry> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(added, _)| !self.is_expired(*added, now))
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_touched = Instant::now();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_touched(&self) -> Instant {
        self.last_touched
    }
}

type SharedWindow = Arc<Mutex<ContextWindow>>;

fn lock(window: &SharedWindow) -> MutexGuard<'_, ContextWindow> {
    window.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Channel id → context window.
pub struct ContextStore {
    capacity: usize,
    max_age: Option<Duration>,
    windows: DashMap<String, SharedWindow>,
}

impl ContextStore {
    /// `capacity` is fixed for every window this store creates.
    pub fn new(capacity: usize) -> Self {
        Self::with_max_age(capacity, None)
    }

    pub fn with_max_age(capacity: usize, max_age: Option<Duration>) -> Self {
        Self {
            capacity: capacity.max(1),
            max_age,
            windows: DashMap::new(),
        }
    }

    // Clone the Arc out so the shard lock is released before the window lock
    // is taken.
    fn window(&self, channel: &str) -> Option<SharedWindow> {
        self.windows.get(channel).map(|w| w.value().clone())
    }

    fn window_or_create(&self, channel: &str) -> SharedWindow {
        if let Some(window) = self.window(channel) {
            return window;
        }
        self.windows
            .entry(channel.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ContextWindow::with_max_age(
                    self.capacity,
                    self.max_age,
                )))
            })
            .value()
            .clone()
    }

    /// Append `entry` to `channel`'s window, creating the window on first use.
    pub fn append(&self, channel: &str, entry: ContextEntry) {
        let window = self.window_or_create(channel);
        lock(&window).push(entry);
    }

    /// Chronological copy of `channel`'s entries. Empty for unknown channels.
    pub fn snapshot(&self, channel: &str) -> Vec<ContextEntry> {
        self.window(channel)
            .map(|w| lock(&w).snapshot())
            .unwrap_or_default()
    }

    /// Empty `channel`'s window. Returns whether the channel had one.
    pub fn clear(&self, channel: &str) -> bool {
        match self.window(channel) {
            Some(window) => {
                lock(&window).clear();
                true
            }
            None => false,
        }
    }

    pub fn last_touched(&self, channel: &str) -> Option<Instant> {
        self.window(channel).map(|w| lock(&w).last_touched())
    }

    /// Drop every window not touched within `older_than`. Returns how many
    /// were removed.
    pub fn evict_idle(&self, older_than: Duration) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.duration_since(lock(window).last_touched()) <= older_than);
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, "Evicted idle context windows");
        }
        evicted
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.windows.contains_key(channel)
    }

    pub fn channel_count(&self) -> usize {
        self.windows.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
