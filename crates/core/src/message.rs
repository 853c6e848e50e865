//! Conversation history entries and outbound messages.
//!
//! Viewer says something → it becomes a [`ContextEntry`] → the pipeline
//! produces at most one [`OutboundMessage`] → the connector sends it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a context entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryRole {
    Viewer,
    Bot,
}

/// One turn in a channel's conversation. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: EntryRole,

    /// Display name of the speaker
    pub author: String,

    pub text: String,

    pub timestamp: DateTime<Utc>,
}

impl ContextEntry {
    /// Create a viewer entry.
    pub fn viewer(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: EntryRole::Viewer,
            author: author.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a bot entry.
    pub fn bot(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: EntryRole::Bot,
            author: author.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Where an outbound message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Result (or denial) of a registered command
    Command,
    /// Completion from the text-generation service
    Generated,
    /// Fixed reaction to a follow, subscription or raid
    TemplatedEvent,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Command => "command",
            Self::Generated => "generated",
            Self::TemplatedEvent => "templated_event",
        };
        f.write_str(s)
    }
}

/// A message ready to be handed back to the platform connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: String,

    /// Target chat channel
    pub channel: String,

    pub text: String,

    pub provenance: Provenance,

    /// Sequence number of the event this answers
    pub in_reply_to: u64,

    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(
        channel: impl Into<String>,
        text: impl Into<String>,
        provenance: Provenance,
        in_reply_to: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel: channel.into(),
            text: text.into(),
            provenance,
            in_reply_to,
            created_at: Utc::now(),
        }
    }
}
