//! Error types for the streamchat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum. Note that a full ingestion
//! queue and a stale event are policy outcomes, not errors, so neither
//! appears here.

use thiserror::Error;

/// The top-level error type for all streamchat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Text-generation service errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Platform connector errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Command table errors ---
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Typed failures from the external text-generation service.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Empty completion from provider")]
    EmptyCompletion,
}

impl ProviderError {
    /// Whether a single bounded retry may help.
    ///
    /// Server-side and transport failures are retryable; credentials and
    /// configuration problems are not, and neither is a 4xx other than 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_) | Self::NotConfigured(_) | Self::EmptyCompletion => {
                false
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid inbound payload: {0}")]
    InvalidPayload(String),
}

/// Errors raised while building the command table. These only occur at
/// startup; the table is read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Duplicate command trigger: {0}")]
    DuplicateTrigger(String),

    #[error("Invalid command trigger '{trigger}': {reason}")]
    InvalidTrigger { trigger: String, reason: String },
}
