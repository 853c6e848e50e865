//! Inbound events: the unit of work flowing through the pipeline.
//!
//! A [`ChatEvent`] is built by a platform connector, stamped with a sequence
//! number by the ingestion queue, consumed once by the orchestrator and then
//! discarded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of inbound unit this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Ordinary chat line
    Message,
    /// A viewer followed the channel
    Follow,
    /// A viewer subscribed (or resubscribed)
    Subscription,
    /// Another broadcaster raided the channel
    Raid,
    /// A platform-native command invocation (e.g. a slash command)
    CommandInvocation,
}

impl EventKind {
    /// Follows, subscriptions and raids get a templated reaction.
    pub fn is_platform_event(self) -> bool {
        matches!(self, Self::Follow | Self::Subscription | Self::Raid)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Message => "message",
            Self::Follow => "follow",
            Self::Subscription => "subscription",
            Self::Raid => "raid",
            Self::CommandInvocation => "command_invocation",
        };
        f.write_str(s)
    }
}

/// Privilege of the author within the channel.
///
/// Ordered: `Viewer < Moderator < Broadcaster`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    #[default]
    Viewer,
    Moderator,
    Broadcaster,
}

impl AuthorRole {
    /// Whether this role meets `required`.
    pub fn satisfies(self, required: AuthorRole) -> bool {
        self >= required
    }
}

impl std::str::FromStr for AuthorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viewer" | "v" => Ok(Self::Viewer),
            "moderator" | "mod" | "m" => Ok(Self::Moderator),
            "broadcaster" | "b" => Ok(Self::Broadcaster),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// One inbound unit from the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Chat namespace this event belongs to (e.g. `#somestreamer`)
    pub channel: String,

    /// Platform-specific author identifier
    pub author_id: String,

    /// Human-readable author name
    pub author_name: String,

    /// Author privilege
    #[serde(default)]
    pub author_role: AuthorRole,

    /// Raw text (empty for most platform events)
    #[serde(default)]
    pub text: String,

    pub kind: EventKind,

    /// When the platform says this happened
    pub timestamp: DateTime<Utc>,

    /// Assigned by the ingestion queue; 0 until then
    #[serde(default)]
    pub sequence: u64,

    /// Platform-specific extras (`months`, `viewers`, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ChatEvent {
    /// Create a new event of the given kind, authored by a viewer.
    pub fn new(
        kind: EventKind,
        channel: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let author = author.into();
        Self {
            channel: channel.into(),
            author_id: author.to_lowercase(),
            author_name: author,
            author_role: AuthorRole::Viewer,
            text: text.into(),
            kind,
            timestamp: Utc::now(),
            sequence: 0,
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a chat message event.
    pub fn message(
        channel: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(EventKind::Message, channel, author, text)
    }

    /// Create a follow event.
    pub fn follow(channel: impl Into<String>, author: impl Into<String>) -> Self {
        Self::new(EventKind::Follow, channel, author, "")
    }

    /// Create a subscription event.
    pub fn subscription(channel: impl Into<String>, author: impl Into<String>, months: u32) -> Self {
        Self::new(EventKind::Subscription, channel, author, "").with_metadata("months", months)
    }

    /// Create a raid event.
    pub fn raid(channel: impl Into<String>, author: impl Into<String>, viewers: u32) -> Self {
        Self::new(EventKind::Raid, channel, author, "").with_metadata("viewers", viewers)
    }

    /// Set the author's role.
    pub fn with_role(mut self, role: AuthorRole) -> Self {
        self.author_role = role;
        self
    }

    /// Attach a metadata value.
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Whether the text mentions `@username` (case-insensitive).
    pub fn mentions(&self, username: &str) -> bool {
        let needle = format!("@{}", username.to_lowercase());
        self.text.to_lowercase().contains(&needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering() {
        assert!(AuthorRole::Viewer < AuthorRole::Moderator);
        assert!(AuthorRole::Moderator < AuthorRole::Broadcaster);
        assert!(AuthorRole::Broadcaster.satisfies(AuthorRole::Moderator));
        assert!(!AuthorRole::Viewer.satisfies(AuthorRole::Moderator));
        assert!(AuthorRole::Viewer.satisfies(AuthorRole::Viewer));
    }

    #[test]
    fn role_parsing() {
        assert_eq!("MOD".parse::<AuthorRole>().unwrap(), AuthorRole::Moderator);
        assert_eq!("broadcaster".parse::<AuthorRole>().unwrap(), AuthorRole::Broadcaster);
        assert!("admin".parse::<AuthorRole>().is_err());
    }

    #[test]
    fn platform_event_classification() {
        assert!(EventKind::Raid.is_platform_event());
        assert!(EventKind::Follow.is_platform_event());
        assert!(!EventKind::Message.is_platform_event());
        assert!(!EventKind::CommandInvocation.is_platform_event());
    }

    #[test]
    fn constructors_fill_metadata() {
        let raid = ChatEvent::raid("#chan", "Raider", 42);
        assert_eq!(raid.kind, EventKind::Raid);
        assert_eq!(raid.metadata["viewers"], 42);
        assert_eq!(raid.author_id, "raider");
        assert_eq!(raid.sequence, 0);
    }

    #[test]
    fn mention_detection_is_case_insensitive() {
        let ev = ChatEvent::message("#chan", "alice", "hey @StreamChat how are you");
        assert!(ev.mentions("streamchat"));
        assert!(!ev.mentions("otherbot"));
    }
}
