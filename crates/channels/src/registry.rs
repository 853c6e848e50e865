//! Channel registry: manages all active connector instances.
//!
//! Merges inbound events from every connector into one stream for the
//! pipeline, remembers which connector each chat channel arrived on, and
//! routes outbound messages back through that connector.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use streamchat_core::channel::{Channel, OutboundSink};
use streamchat_core::error::ChannelError;
use streamchat_core::event::ChatEvent;
use streamchat_core::message::OutboundMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Capacity of the merged inbound stream.
const MERGED_BUFFER: usize = 256;

/// Central registry holding all enabled connectors.
#[derive(Default)]
pub struct ChannelRegistry {
    connectors: HashMap<String, Arc<dyn Channel>>,
    /// chat channel → connector name
    routes: Arc<DashMap<String, String>>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector.
    pub fn register(&mut self, connector: Arc<dyn Channel>) {
        let name = connector.name().to_string();
        info!(connector = %name, "Registered connector");
        self.connectors.insert(name, connector);
    }

    /// Get a connector by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.connectors.get(name)
    }

    /// List all registered connector names.
    pub fn list(&self) -> Vec<String> {
        self.connectors.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Connector that last delivered an event for `channel`.
    pub fn route(&self, channel: &str) -> Option<String> {
        self.routes.get(channel).map(|r| r.value().clone())
    }

    /// Start all connectors and merge their event streams into one receiver.
    pub async fn start_all(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChatEvent, ChannelError>>, ChannelError> {
        let (merged_tx, merged_rx) = mpsc::channel(MERGED_BUFFER);

        for (name, connector) in &self.connectors {
            let mut rx = connector.start().await?;
            let tx = merged_tx.clone();
            let routes = self.routes.clone();
            let connector_name = name.clone();

            tokio::spawn(async move {
                while let Some(next) = rx.recv().await {
                    if let Ok(event) = &next {
                        routes.insert(event.channel.clone(), connector_name.clone());
                    }
                    if tx.send(next).await.is_err() {
                        break; // Merged receiver dropped
                    }
                }
                debug!(connector = %connector_name, "Connector stream ended");
            });

            info!(connector = %name, "Started connector");
        }

        Ok(merged_rx)
    }

    /// Send a message through a specific connector.
    pub async fn send_to(
        &self,
        connector_name: &str,
        message: &OutboundMessage,
    ) -> Result<(), ChannelError> {
        let connector = self.connectors.get(connector_name).ok_or_else(|| {
            ChannelError::NotConfigured(format!("Connector '{connector_name}' not found"))
        })?;

        connector.send(message).await
    }

    /// Pick the connector for an outbound message: the one its channel came in
    /// on, or the only connector there is.
    fn resolve(&self, channel: &str) -> Result<String, ChannelError> {
        if let Some(name) = self.route(channel) {
            return Ok(name);
        }
        match self.connectors.keys().next() {
            Some(name) if self.connectors.len() == 1 => Ok(name.clone()),
            _ => Err(ChannelError::NotConfigured(format!(
                "No connector known for channel '{channel}'"
            ))),
        }
    }

    /// Stop all connectors gracefully.
    pub async fn stop_all(&self) {
        for (name, connector) in &self.connectors {
            if let Err(e) = connector.stop().await {
                warn!(connector = %name, error = %e, "Failed to stop connector");
            }
        }
    }

    /// Run health checks on all connectors.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for (name, connector) in &self.connectors {
            let healthy = connector.health_check().await.unwrap_or(false);
            results.insert(name.clone(), healthy);
        }
        results
    }
}

#[async_trait]
impl OutboundSink for ChannelRegistry {
    async fn deliver(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        let connector = self.resolve(&message.channel)?;
        self.send_to(&connector, &message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use streamchat_core::message::Provenance;

    struct MockConnector {
        name: String,
        inbound: Mutex<Option<mpsc::Receiver<Result<ChatEvent, ChannelError>>>>,
        sent: Mutex<Vec<String>>,
        started: AtomicBool,
        stopped: AtomicBool,
    }

    impl MockConnector {
        fn new(name: &str) -> (Arc<Self>, mpsc::Sender<Result<ChatEvent, ChannelError>>) {
            let (tx, rx) = mpsc::channel(8);
            let connector = Arc::new(Self {
                name: name.into(),
                inbound: Mutex::new(Some(rx)),
                sent: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            });
            (connector, tx)
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Channel for MockConnector {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(
            &self,
        ) -> Result<mpsc::Receiver<Result<ChatEvent, ChannelError>>, ChannelError> {
            self.started.store(true, Ordering::SeqCst);
            self.inbound
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| ChannelError::NotConfigured("already started".into()))
        }

        async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(message.text.clone());
            Ok(())
        }

        async fn stop(&self) -> Result<(), ChannelError> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn health_check(&self) -> Result<bool, ChannelError> {
            Ok(self.started.load(Ordering::SeqCst))
        }
    }

    fn reply(channel: &str, text: &str) -> OutboundMessage {
        OutboundMessage::new(channel, text, Provenance::Generated, 1)
    }

    #[test]
    fn register_and_list() {
        let mut reg = ChannelRegistry::new();
        assert!(reg.is_empty());
        reg.register(MockConnector::new("twitch").0);
        reg.register(MockConnector::new("console").0);

        assert_eq!(reg.len(), 2);
        assert!(reg.list().contains(&"twitch".to_string()));
        assert!(reg.get("console").is_some());
        assert!(reg.get("slack").is_none());
    }

    #[tokio::test]
    async fn merges_streams_and_learns_routes() {
        let (a, a_tx) = MockConnector::new("a");
        let (b, b_tx) = MockConnector::new("b");
        let mut reg = ChannelRegistry::new();
        reg.register(a.clone());
        reg.register(b.clone());

        let mut merged = reg.start_all().await.unwrap();
        a_tx.send(Ok(ChatEvent::message("#one", "x", "hi"))).await.unwrap();
        b_tx.send(Ok(ChatEvent::message("#two", "y", "yo"))).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(merged.recv().await.unwrap().unwrap().channel);
        }
        seen.sort();
        assert_eq!(seen, vec!["#one", "#two"]);
        assert_eq!(reg.route("#one").as_deref(), Some("a"));
        assert_eq!(reg.route("#two").as_deref(), Some("b"));

        reg.deliver(reply("#two", "back to b")).await.unwrap();
        assert_eq!(b.sent(), vec!["back to b"]);
        assert!(a.sent().is_empty());

        let err = reg.deliver(reply("#nowhere", "lost")).await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn single_connector_is_the_fallback_route() {
        let (only, _tx) = MockConnector::new("console");
        let mut reg = ChannelRegistry::new();
        reg.register(only.clone());

        reg.deliver(reply("#anything", "hello")).await.unwrap();
        assert_eq!(only.sent(), vec!["hello"]);
    }

    #[tokio::test]
    async fn connector_errors_pass_through() {
        let (a, a_tx) = MockConnector::new("a");
        let mut reg = ChannelRegistry::new();
        reg.register(a);

        let mut merged = reg.start_all().await.unwrap();
        a_tx.send(Err(ChannelError::ConnectionLost("socket closed".into())))
            .await
            .unwrap();
        let next = merged.recv().await.unwrap();
        assert!(matches!(next, Err(ChannelError::ConnectionLost(_))));
    }

    #[tokio::test]
    async fn lifecycle_and_health() {
        let (ch, _tx) = MockConnector::new("test");
        let mut reg = ChannelRegistry::new();
        reg.register(ch.clone());

        let health = reg.health_check_all().await;
        assert_eq!(health.get("test"), Some(&false));

        let _rx = reg.start_all().await.unwrap();
        let health = reg.health_check_all().await;
        assert_eq!(health.get("test"), Some(&true));

        reg.stop_all().await;
        assert!(ch.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn send_to_unknown_connector_fails() {
        let reg = ChannelRegistry::new();
        let result = reg.send_to("nonexistent", &reply("#c", "x")).await;
        assert!(matches!(result, Err(ChannelError::NotConfigured(_))));
    }
}
