//! Broker gateway: publish to a destination, subscribe with a callback.
//!
//! Destinations are opaque strings; whether one names a topic or a queue
//! is broker configuration, not bridge logic.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};

/// Payload of a delivered message. The transformation pipeline only
/// processes text; binary deliveries are acknowledged and dropped.
#[derive(Debug, Clone)]
pub enum MessagePayload {
    Text(String),
    Binary(Vec<u8>),
}

/// A message delivered to a subscription callback.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub payload: MessagePayload,
    pub message_id: String,
    pub correlation_id: Option<String>,
    pub properties: HashMap<String, String>,
}

/// Subscription callback. Invoked on broker-owned tasks; implementations
/// must be re-entrant and must not hold locks across awaits.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, message: InboundMessage);
}

/// Opaque broker client.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Publish `payload` to `destination` with message properties.
    async fn publish(
        &self,
        destination: &str,
        payload: &str,
        properties: &HashMap<String, String>,
    ) -> BridgeResult<()>;

    /// Attach a durable consumer to `destination`.
    async fn subscribe(
        &self,
        destination: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> BridgeResult<()>;
}

/// A publish captured by [`InMemoryBroker`].
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub destination: String,
    pub payload: String,
    pub properties: HashMap<String, String>,
}

/// Loopback broker for development profiles and tests.
///
/// Publishes deliver synchronously to every subscriber of the destination
/// and are recorded for inspection. A bounded number of upcoming publishes
/// can be made to fail, to exercise retry paths.
pub struct InMemoryBroker {
    subscribers: RwLock<HashMap<String, Vec<Arc<dyn MessageHandler>>>>,
    published: RwLock<Vec<PublishedMessage>>,
    fail_next_publishes: AtomicU64,
    sequence: AtomicU64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            published: RwLock::new(Vec::new()),
            fail_next_publishes: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    /// Fail the next `count` publishes with a transient error.
    pub fn fail_next_publishes(&self, count: u64) {
        self.fail_next_publishes.store(count, Ordering::SeqCst);
    }

    /// Every publish recorded so far for `destination`.
    pub fn published_to(&self, destination: &str) -> Vec<PublishedMessage> {
        self.published
            .read()
            .iter()
            .filter(|m| m.destination == destination)
            .cloned()
            .collect()
    }

    /// Total number of recorded publishes.
    pub fn published_count(&self) -> usize {
        self.published.read().len()
    }

    /// Inject a message to every subscriber of `destination`, as a broker
    /// delivery would.
    pub async fn deliver(&self, destination: &str, message: InboundMessage) {
        let handlers: Vec<Arc<dyn MessageHandler>> = self
            .subscribers
            .read()
            .get(destination)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler.on_message(message.clone()).await;
        }
    }

    fn next_message_id(&self) -> String {
        format!("mem-{}", self.sequence.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerGateway for InMemoryBroker {
    async fn publish(
        &self,
        destination: &str,
        payload: &str,
        properties: &HashMap<String, String>,
    ) -> BridgeResult<()> {
        let remaining = self.fail_next_publishes.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .fail_next_publishes
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(BridgeError::Publish("transient broker error".into()));
        }

        self.published.write().push(PublishedMessage {
            destination: destination.to_string(),
            payload: payload.to_string(),
            properties: properties.clone(),
        });

        let message = InboundMessage {
            payload: MessagePayload::Text(payload.to_string()),
            message_id: self.next_message_id(),
            correlation_id: properties.get("correlationId").cloned(),
            properties: properties.clone(),
        };
        self.deliver(destination, message).await;
        Ok(())
    }

    async fn subscribe(
        &self,
        destination: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> BridgeResult<()> {
        self.subscribers
            .write()
            .entry(destination.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }
}
