//! Data model for pipeline metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The counters the pipeline maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    EventsAccepted,
    EventsDropped,
    CommandsDispatched,
    CommandsDenied,
    GenerationsSucceeded,
    GenerationsFailed,
    GenerationsShedStale,
}

impl Counter {
    pub const ALL: [Counter; 7] = [
        Counter::EventsAccepted,
        Counter::EventsDropped,
        Counter::CommandsDispatched,
        Counter::CommandsDenied,
        Counter::GenerationsSucceeded,
        Counter::GenerationsFailed,
        Counter::GenerationsShedStale,
    ];

    /// Stable metric name, e.g. `events-accepted`.
    pub fn name(self) -> &'static str {
        match self {
            Counter::EventsAccepted => "events-accepted",
            Counter::EventsDropped => "events-dropped",
            Counter::CommandsDispatched => "commands-dispatched",
            Counter::CommandsDenied => "commands-denied",
            Counter::GenerationsSucceeded => "generations-succeeded",
            Counter::GenerationsFailed => "generations-failed",
            Counter::GenerationsShedStale => "generations-shed-stale",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A point-in-time copy of all counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub events_accepted: u64,
    pub events_dropped: u64,
    pub commands_dispatched: u64,
    pub commands_denied: u64,
    pub generations_succeeded: u64,
    pub generations_failed: u64,
    pub generations_shed_stale: u64,
    /// When the snapshot was taken.
    pub taken_at: Option<DateTime<Utc>>,
}

impl MetricsSnapshot {
    /// Read one counter out of the snapshot.
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::EventsAccepted => self.events_accepted,
            Counter::EventsDropped => self.events_dropped,
            Counter::CommandsDispatched => self.commands_dispatched,
            Counter::CommandsDenied => self.commands_denied,
            Counter::GenerationsSucceeded => self.generations_succeeded,
            Counter::GenerationsFailed => self.generations_failed,
            Counter::GenerationsShedStale => self.generations_shed_stale,
        }
    }

    /// Total generation attempts that reached a verdict.
    pub fn generations_total(&self) -> u64 {
        self.generations_succeeded + self.generations_failed
    }
}
