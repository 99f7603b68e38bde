use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::connector::{Broker, BrokerLink, InboundMessage, Inbox};
use crate::error::{Error, Result};

/// A message handed to [`BrokerLink::publish`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct BrokerState {
    connect_failures: u32,
    connect_attempts: u32,
    fail_publishes: bool,
    fail_subscribes: bool,
    subscriptions: Vec<String>,
    unsubscriptions: Vec<String>,
    published: Vec<PublishedMessage>,
    disconnects: u32,
    session: Option<mpsc::UnboundedSender<Result<InboundMessage>>>,
}

/// In-memory broker with scriptable failures.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().connect_failures = count;
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.lock().fail_publishes = fail;
    }

    pub fn fail_subscribes(&self, fail: bool) {
        self.lock().fail_subscribes = fail;
    }

    /// Deliver a message to the live session, if any.
    pub fn inject(&self, topic: &str, payload: Vec<u8>) {
        if let Some(session) = &self.lock().session {
            let _ = session.send(Ok(InboundMessage {
                topic: topic.to_string(),
                payload,
            }));
        }
    }

    /// Kill the live session as if the network went away.
    pub fn drop_connection(&self) {
        if let Some(session) = self.lock().session.take() {
            let _ = session.send(Err(Error::Transport("connection dropped".to_string())));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().session.is_some()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.clone()
    }

    pub fn unsubscriptions(&self) -> Vec<String> {
        self.lock().unsubscriptions.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    pub fn disconnects(&self) -> u32 {
        self.lock().disconnects
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn host(&self) -> &str {
        "memory"
    }

    fn port(&self) -> u16 {
        1883
    }

    async fn connect(&self) -> Result<(Arc<dyn BrokerLink>, Box<dyn Inbox>)> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(Error::Transport("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.session = Some(tx);

        Ok((
            Arc::new(MemoryLink {
                broker: self.clone(),
            }),
            Box::new(MemoryInbox { rx }),
        ))
    }
}

struct MemoryLink {
    broker: MemoryBroker,
}

#[async_trait]
impl BrokerLink for MemoryLink {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        let mut state = self.broker.lock();
        if state.fail_subscribes {
            return Err(Error::Transport("subscribe rejected".to_string()));
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.broker.lock().unsubscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let mut state = self.broker.lock();
        if state.fail_publishes {
            return Err(Error::Transport("publish rejected".to_string()));
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.broker.lock();
        state.disconnects += 1;
        state.session = None;
        Ok(())
    }
}

struct MemoryInbox {
    rx: mpsc::UnboundedReceiver<Result<InboundMessage>>,
}

#[async_trait]
impl Inbox for MemoryInbox {
    async fn next(&mut self) -> Result<InboundMessage> {
        match self.rx.recv().await {
            Some(message) => message,
            None => Err(Error::Transport("session closed".to_string())),
        }
    }
}
