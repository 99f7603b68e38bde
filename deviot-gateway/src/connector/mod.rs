//! Publish/subscribe connection lifecycle.
//!
//! The [`Connector`] owns one background task that connects to the broker,
//! subscribes to the gateway's action topic and forwards every inbound action
//! to an [`ActionDispatcher`]. When the session fails the task waits out an
//! exponential backoff and tries again, until [`Connector::stop`] is called.

mod broker;
mod mqtt;
mod retry;

pub use broker::{Broker, BrokerLink, InboundMessage, Inbox};
pub use mqtt::MqttBroker;
pub use retry::BackoffPolicy;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use deviot_common::Topics;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::transition::{Outcome, TransitionTracker};

/// How long a clean shutdown waits for the transport to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Receives inbound action messages.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, payload: Value) -> Result<()>;
}

/// Connection state of a [`Connector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// State shared between the connector handle and its background task.
struct Shared {
    broker: Arc<dyn Broker>,
    topics: Topics,
    /// Present only while connected.
    link: RwLock<Option<Arc<dyn BrokerLink>>>,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn set_link(&self, link: Option<Arc<dyn BrokerLink>>) {
        *self.link.write().await = link;
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Publish/subscribe connector for one gateway.
pub struct Connector {
    shared: Arc<Shared>,
    backoff: BackoffPolicy,
    worker: Mutex<Option<Worker>>,
}

impl Connector {
    /// Create a connector. Topics are derived here, once, from `owner` and `name`.
    pub fn new(broker: Arc<dyn Broker>, owner: &str, name: &str, backoff: BackoffPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                broker,
                topics: Topics::derive(owner, name),
                link: RwLock::new(None),
                state,
            }),
            backoff,
            worker: Mutex::new(None),
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.shared.topics
    }

    pub fn host(&self) -> &str {
        self.shared.broker.host()
    }

    pub fn port(&self) -> u16 {
        self.shared.broker.port()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    /// Start the connect/listen loop. No-op if it is already running.
    pub async fn start(&self, dispatcher: Arc<dyn ActionDispatcher>) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            tracing::warn!(broker = %self.address(), "Connector already started");
            return;
        }

        let cancel = CancellationToken::new();
        let connection = ConnectionLoop {
            shared: self.shared.clone(),
            dispatcher,
            backoff: self.backoff.build(),
            max_delay: self.backoff.max,
            tracker: TransitionTracker::new(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(connection.run());

        *worker = Some(Worker { cancel, handle });
    }

    /// Stop the loop and close the connection.
    ///
    /// Interrupts any backoff wait. When this returns the loop has exited.
    /// The worker lock is held until then so a concurrent `start` cannot
    /// race the old loop's teardown.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        let Some(running) = worker.take() else {
            tracing::warn!(broker = %self.address(), "Connector already stopped");
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            tracing::error!(broker = %self.address(), error = %e, "Connector task failed");
        }
        tracing::info!(broker = %self.address(), "Connector stopped");
    }

    /// Publish `payload` as JSON on the data topic.
    ///
    /// Best effort: dropped when not connected, logged and dropped when the
    /// transport fails. Never waits for a reconnect.
    pub async fn publish<T: Serialize + ?Sized>(&self, payload: &T) {
        let link = self.shared.link.read().await.clone();
        let Some(link) = link else {
            tracing::debug!(topic = %self.shared.topics.data, "Not connected, dropping data");
            return;
        };

        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize data");
                return;
            }
        };

        if let Err(e) = link.publish(&self.shared.topics.data, bytes).await {
            tracing::error!(topic = %self.shared.topics.data, error = %e, "Failed to publish data");
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }
}

/// Background connect/listen loop.
struct ConnectionLoop {
    shared: Arc<Shared>,
    dispatcher: Arc<dyn ActionDispatcher>,
    backoff: ExponentialBackoff,
    max_delay: Duration,
    tracker: TransitionTracker,
    cancel: CancellationToken,
}

impl ConnectionLoop {
    async fn run(mut self) {
        let broker = format!("{}:{}", self.shared.broker.host(), self.shared.broker.port());
        self.shared.set_state(ConnectionState::Connecting);

        loop {
            match self.session(&broker).await {
                Ok(()) => break,
                Err(e) => {
                    self.shared.set_link(None).await;
                    self.shared.set_state(ConnectionState::Reconnecting);

                    let delay = self.backoff.next_backoff().unwrap_or(self.max_delay);
                    if self.tracker.observe(Outcome::Failing) {
                        tracing::error!(
                            broker = %broker,
                            error = %e,
                            delay_secs = delay.as_secs_f64(),
                            "MQTT server disconnected, reconnecting"
                        );
                    } else {
                        tracing::debug!(
                            broker = %broker,
                            error = %e,
                            delay_secs = delay.as_secs_f64(),
                            "MQTT reconnect failed"
                        );
                    }

                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.shared.set_link(None).await;
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// One connection attempt followed by listening until failure or stop.
    ///
    /// Returns `Ok` only when stopped.
    async fn session(&mut self, broker: &str) -> Result<()> {
        let connected = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            connected = self.shared.broker.connect() => connected,
        };
        let (link, mut inbox) = connected?;

        if let Err(e) = link.subscribe(&self.shared.topics.action).await {
            if let Err(close) = link.disconnect().await {
                tracing::debug!(broker = %broker, error = %close, "Failed to disconnect after subscribe failure");
            }
            return Err(e);
        }

        self.shared.set_link(Some(link.clone())).await;
        self.shared.set_state(ConnectionState::Connected);
        self.backoff.reset();

        if self.tracker.observe(Outcome::Healthy) {
            tracing::info!(broker = %broker, topic = %self.shared.topics.action, "MQTT server connected");
        } else {
            tracing::debug!(broker = %broker, "MQTT server reconnected");
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.shared.set_link(None).await;
                    self.close(broker, link.as_ref(), inbox.as_mut()).await;
                    return Ok(());
                }
                message = inbox.next() => {
                    self.handle(message?).await;
                }
            }
        }
    }

    /// Forward one inbound message. Failures are logged and never end the session.
    async fn handle(&self, message: InboundMessage) {
        if message.topic != self.shared.topics.action {
            tracing::debug!(topic = %message.topic, "Ignoring message on unexpected topic");
            return;
        }

        let payload: Value = match serde_json::from_slice(&message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    message = %String::from_utf8_lossy(&message.payload),
                    error = %e,
                    "Failed to call action: malformed message"
                );
                return;
            }
        };

        if let Err(e) = self.dispatcher.dispatch(payload.clone()).await {
            tracing::error!(message = %payload, error = %e, "Failed to call action");
        }
    }

    async fn close(&self, broker: &str, link: &dyn BrokerLink, inbox: &mut dyn Inbox) {
        if let Err(e) = link.unsubscribe(&self.shared.topics.action).await {
            tracing::warn!(error = %e, "Failed to unsubscribe from action topic");
        }
        if let Err(e) = link.disconnect().await {
            tracing::warn!(error = %e, "Failed to disconnect cleanly");
        }

        // Let the transport flush the requests above
        let drain = async { while inbox.next().await.is_ok() {} };
        let _ = timeout(CLOSE_GRACE, drain).await;
        tracing::info!(broker = %broker, "Disconnected from broker");
    }
}
