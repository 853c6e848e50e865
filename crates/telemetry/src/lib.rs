//! Pipeline counters for streamchat.
//!
//! Every policy decision the pipeline makes (an event shed from a full
//! queue, a command refused, a stale event left unanswered, a generation
//! call that failed) is counted here, so nothing is ever silently lost.
//! The sink format is left to the caller: take a [`MetricsSnapshot`] and
//! log it, serialize it, or export it.

pub mod engine;
pub mod model;

pub use engine::PipelineMetrics;
pub use model::{Counter, MetricsSnapshot};
