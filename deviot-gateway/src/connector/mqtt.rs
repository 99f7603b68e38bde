//! MQTT transport backed by `rumqttc`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::time::timeout;
use uuid::Uuid;

use super::broker::{Broker, BrokerLink, InboundMessage, Inbox};
use crate::config::{BrokerAddress, BrokerConfig};
use crate::error::{Error, Result};

/// Smallest keep-alive accepted by the client library.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Capacity of the client's request queue.
const REQUEST_CAPACITY: usize = 100;

/// MQTT broker reachable over TCP.
pub struct MqttBroker {
    address: BrokerAddress,
    client_id: String,
    keep_alive: Duration,
    connect_timeout: Duration,
}

impl MqttBroker {
    pub fn new(address: BrokerAddress, client_id: impl Into<String>) -> Self {
        Self {
            address,
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &BrokerConfig, gateway_name: &str) -> Result<Self> {
        let address = BrokerAddress::parse(&config.url)?;
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| generate_client_id(gateway_name));

        Ok(Self {
            address,
            client_id,
            keep_alive: Duration::from_secs(config.keep_alive_secs).max(MIN_KEEP_ALIVE),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// `deviot-<name>-<8 hex>`, restricted to characters every broker accepts.
fn generate_client_id(gateway_name: &str) -> String {
    let name: String = gateway_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .take(32)
        .collect();
    let short = Uuid::new_v4().simple().to_string();
    format!("deviot-{}-{}", name, &short[..8])
}

#[async_trait]
impl Broker for MqttBroker {
    fn host(&self) -> &str {
        &self.address.host
    }

    fn port(&self) -> u16 {
        self.address.port
    }

    async fn connect(&self) -> Result<(Arc<dyn BrokerLink>, Box<dyn Inbox>)> {
        let mut options = MqttOptions::new(
            self.client_id.clone(),
            self.address.host.clone(),
            self.address.port,
        );
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        // The event loop only returns ConnAck once the broker accepted us
        let connack = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(_) => continue,
                    Err(e) => return Err(Error::Transport(e.to_string())),
                }
            }
        };
        timeout(self.connect_timeout, connack)
            .await
            .map_err(|_| {
                Error::Transport(format!("timed out connecting to {}", self.address))
            })??;

        tracing::debug!(broker = %self.address, client_id = %self.client_id, "MQTT session established");

        Ok((
            Arc::new(MqttLink { client }),
            Box::new(MqttInbox { event_loop }),
        ))
    }
}

struct MqttLink {
    client: AsyncClient,
}

#[async_trait]
impl BrokerLink for MqttLink {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| Error::Transport(format!("failed to subscribe to '{}': {}", topic, e)))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|e| Error::Transport(format!("failed to unsubscribe from '{}': {}", topic, e)))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        // Never wait for queue space: a full queue drops the message
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| Error::Transport(format!("failed to publish to '{}': {}", topic, e)))
    }

    async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| Error::Transport(format!("failed to disconnect: {}", e)))
    }
}

struct MqttInbox {
    event_loop: EventLoop,
}

#[async_trait]
impl Inbox for MqttInbox {
    async fn next(&mut self) -> Result<InboundMessage> {
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return Err(Error::Transport("broker sent disconnect".to_string()));
                }
                Ok(event) => {
                    tracing::trace!(?event, "MQTT event");
                }
                Err(e) => return Err(Error::Transport(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_client_id() {
        let id = generate_client_id("home/hub@1");
        assert!(id.starts_with("deviot-homehub1-"));
        assert_eq!(id.len(), "deviot-homehub1-".len() + 8);
    }

    #[test]
    fn test_from_config() {
        let config = BrokerConfig {
            url: "mqtt://broker.local:1884".to_string(),
            client_id: Some("fixed".to_string()),
            keep_alive_secs: 1,
            connect_timeout_secs: 3,
        };
        let broker = MqttBroker::from_config(&config, "hub").unwrap();
        assert_eq!(broker.host(), "broker.local");
        assert_eq!(broker.port(), 1884);
        assert_eq!(broker.client_id(), "fixed");
        assert_eq!(broker.keep_alive, MIN_KEEP_ALIVE);
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        // Nothing listens on port 1 on the loopback interface
        let mut broker = MqttBroker::new(
            BrokerAddress {
                host: "127.0.0.1".to_string(),
                port: 1,
            },
            "test",
        );
        broker.connect_timeout = Duration::from_secs(2);
        assert!(matches!(broker.connect().await, Err(Error::Transport(_))));
    }
}
