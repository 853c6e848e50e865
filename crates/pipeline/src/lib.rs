//! The streamchat event pipeline.
//!
//! ```text
//! connector ──enqueue──▶ IngestionQueue ──dequeue──▶ worker(s)
//!                                                     │ per-channel lanes
//!                                                     │ (react, then generate)
//!                     ContextStore ◀──append/snapshot─┤
//!                  CommandDispatcher ◀──dispatch──────┤
//!                 ResponseGenerator ◀──template/generate (rate limited, timed out)
//!                                                     │
//!                                     OutboundSink ◀──┘
//! ```

pub mod commands;
pub mod context;
pub mod generator;
pub mod lanes;
pub mod orchestrator;
pub mod queue;
pub mod rate_limit;

pub use commands::builtin::register_builtins;
pub use commands::{CommandContext, CommandDispatcher, CommandHandler, DispatchOutcome};
pub use context::{ContextStore, ContextWindow};
pub use generator::ResponseGenerator;
pub use lanes::{Admission, ChannelLanes};
pub use orchestrator::{Pipeline, ProcessOutcome};
pub use queue::{EnqueueOutcome, IngestionQueue, QueueItem};
pub use rate_limit::RateLimiter;
