//! Channel trait: the abstraction over streaming-platform connectors.
//!
//! A Channel owns the platform session (sockets, credentials, reconnects) and
//! exposes two things to the core: a stream of inbound [`ChatEvent`]s and a
//! `send` interface for finished [`OutboundMessage`]s. The core never opens
//! connections to the platform itself.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChannelError;
use crate::event::ChatEvent;
use crate::message::OutboundMessage;

/// The core Channel trait.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable connector name (e.g., "console", "twitch").
    fn name(&self) -> &str;

    /// Start reading from the platform.
    ///
    /// Returns a receiver that yields inbound events. The read loop runs in
    /// its own task so it is never stalled by downstream processing.
    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChatEvent, ChannelError>>, ChannelError>;

    /// Send a message to the chat channel it targets.
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError>;

    /// Stop the connector gracefully.
    async fn stop(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Health check: is the connector connected and operational?
    async fn health_check(&self) -> Result<bool, ChannelError> {
        Ok(true)
    }
}

/// Destination for outbound messages produced by the pipeline.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn deliver(&self, message: OutboundMessage) -> Result<(), ChannelError>;
}

#[async_trait]
impl OutboundSink for mpsc::Sender<OutboundMessage> {
    async fn deliver(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        let channel = message.channel.clone();
        self.send(message)
            .await
            .map_err(|e| ChannelError::DeliveryFailed {
                channel,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Provenance;

    #[tokio::test]
    async fn mpsc_sender_is_a_sink() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.deliver(OutboundMessage::new("#chan", "hello", Provenance::Command, 7))
            .await
            .unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.text, "hello");
        assert_eq!(got.in_reply_to, 7);
    }

    #[tokio::test]
    async fn closed_sender_reports_delivery_failure() {
        let (tx, rx) = mpsc::channel::<OutboundMessage>(1);
        drop(rx);
        let err = tx
            .deliver(OutboundMessage::new("#chan", "x", Provenance::Generated, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::DeliveryFailed { .. }));
    }
}
