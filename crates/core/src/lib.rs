//! # streamchat core
//!
//! Domain types, traits, and error definitions for the streamchat event
//! pipeline. This crate has **no runtime dependencies of its own**; it
//! defines the model every other crate is written against.
//!
//! ## Boundaries
//!
//! Everything that talks to the outside world is a trait here:
//! - [`Channel`]: a platform connector delivering [`ChatEvent`]s
//! - [`OutboundSink`]: where finished [`OutboundMessage`]s are handed back
//! - [`Provider`]: the slow, rate-limited text-generation service
//!
//! Implementations live in their own crates, so the pipeline can be tested
//! end to end with scripted stand-ins.

pub mod channel;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use channel::{Channel, OutboundSink};
pub use error::{ChannelError, CommandError, Error, ProviderError, Result};
pub use event::{AuthorRole, ChatEvent, EventKind};
pub use message::{ContextEntry, EntryRole, OutboundMessage, Provenance};
pub use provider::{PromptMessage, PromptRole, Provider, ProviderRequest, ProviderResponse, Usage};
