//! Text-generation provider implementations for streamchat.
//!
//! All providers implement the `streamchat_core::Provider` trait.
//! The router selects the configured provider at startup.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
