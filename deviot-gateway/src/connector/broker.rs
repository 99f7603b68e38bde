//! Publish/subscribe transport abstraction.
//!
//! The connector only needs to connect, subscribe, publish and receive. Each
//! transport (MQTT, the in-memory broker used by tests) implements these
//! traits so the reconnect logic stays transport-independent.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Factory for broker sessions.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Broker host, as announced in the registration heartbeat.
    fn host(&self) -> &str;

    fn port(&self) -> u16;

    /// Open a session. Returns once the broker has accepted the connection.
    async fn connect(&self) -> Result<(Arc<dyn BrokerLink>, Box<dyn Inbox>)>;
}

/// Outbound half of a live session.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<()>;

    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

/// Inbound half of a live session.
#[async_trait]
pub trait Inbox: Send {
    /// Wait for the next message on any subscribed topic.
    ///
    /// An error means the session is gone and must be re-established.
    async fn next(&mut self) -> Result<InboundMessage>;
}
