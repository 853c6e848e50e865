//! Platform connectors for streamchat.
//!
//! Each connector owns one platform session and relays events into the
//! pipeline and outbound messages back out. Connectors are trait-based
//! ([`streamchat_core::Channel`]), so the pipeline never knows which platform
//! it is talking to.
//!
//! Available connectors:
//! - **Console**: stdin/stdout, with a small syntax for users, roles and
//!   platform events
//! - **Registry**: merges connector streams and routes replies back

pub mod console;
pub mod registry;

pub use console::{ConsoleChannel, ConsoleInput, LineParser};
pub use registry::ChannelRegistry;
