//! The gateway: registration heartbeat, connector ownership and action routing.
//!
//! While active, the gateway announces itself and its things to the
//! registration endpoint at a fixed interval, independently of the broker
//! connection, and keeps the [`Connector`] running so remote actions reach
//! the registered things.

mod registration;

pub use registration::RegistrationClient;

use std::sync::Arc;
use std::time::Duration;

use deviot_common::{GatewayRegistration, TransportMode};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::connector::{BackoffPolicy, Broker, Connector, MqttBroker};
use crate::error::Result;
use crate::registry::ThingRegistry;
use crate::thing::Thing;
use crate::transition::{Outcome, TransitionTracker};

/// Everything needed to build a [`Gateway`] apart from the broker.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub name: String,
    /// Account identifier; may be empty.
    pub owner: String,
    pub kind: String,
    /// Full URL the registration heartbeat is POSTed to.
    pub registration_url: String,
    pub heartbeat_interval: Duration,
    pub registration_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl GatewaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.gateway.name.clone(),
            owner: config.gateway.owner.clone(),
            kind: config.gateway.kind.clone(),
            registration_url: config.registration.url(),
            heartbeat_interval: config.registration.interval(),
            registration_timeout: config.registration.timeout(),
            backoff: BackoffPolicy::new(
                Duration::from_secs(config.backoff.base_secs),
                Duration::from_secs(config.backoff.max_secs),
            ),
        }
    }
}

/// Parts shared with the heartbeat task.
struct Inner {
    name: String,
    owner: String,
    kind: String,
    client: RegistrationClient,
    connector: Connector,
    things: Arc<ThingRegistry>,
}

impl Inner {
    async fn registration(&self) -> GatewayRegistration {
        let topics = self.connector.topics();
        GatewayRegistration {
            name: self.name.clone(),
            kind: self.kind.clone(),
            owner: self.owner.clone(),
            host: self.connector.host().to_string(),
            port: self.connector.port(),
            mode: TransportMode::Mqtt,
            data: topics.data.clone(),
            action: topics.action.clone(),
            sensors: self.things.snapshot().await,
        }
    }

    async fn register_once(&self) -> Result<()> {
        let registration = self.registration().await;
        self.client.register(&registration).await
    }
}

struct Heartbeat {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// An edge gateway exposing local things to the cloud.
pub struct Gateway {
    inner: Arc<Inner>,
    heartbeat_interval: Duration,
    heartbeat: Mutex<Option<Heartbeat>>,
}

impl Gateway {
    pub fn new(settings: GatewaySettings, broker: Arc<dyn Broker>) -> Result<Self> {
        let client =
            RegistrationClient::new(settings.registration_url.clone(), settings.registration_timeout)?;
        let connector = Connector::new(broker, &settings.owner, &settings.name, settings.backoff);

        Ok(Self {
            inner: Arc::new(Inner {
                name: settings.name,
                owner: settings.owner,
                kind: settings.kind,
                client,
                connector,
                things: Arc::new(ThingRegistry::new()),
            }),
            heartbeat_interval: settings.heartbeat_interval,
            heartbeat: Mutex::new(None),
        })
    }

    /// Build a gateway talking to the MQTT broker named in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let broker = MqttBroker::from_config(&config.broker, &config.gateway.name)?;
        Self::new(GatewaySettings::from_config(config), Arc::new(broker))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    pub fn connector(&self) -> &Connector {
        &self.inner.connector
    }

    pub fn things(&self) -> &Arc<ThingRegistry> {
        &self.inner.things
    }

    pub async fn is_active(&self) -> bool {
        self.heartbeat.lock().await.is_some()
    }

    /// Start the registration heartbeat and the connector.
    ///
    /// Starting an active gateway only logs a warning.
    pub async fn start(&self) {
        let mut heartbeat = self.heartbeat.lock().await;
        if heartbeat.is_some() {
            tracing::warn!(gateway = %self.inner.name, "Gateway service already started");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            self.inner.clone(),
            self.heartbeat_interval,
            cancel.clone(),
        ));
        *heartbeat = Some(Heartbeat { cancel, handle });

        self.inner
            .connector
            .start(self.inner.things.clone())
            .await;
        tracing::info!(gateway = %self.inner.name, "Gateway service started");
    }

    /// Stop the connector and the registration heartbeat.
    ///
    /// Stopping an idle gateway only logs a warning. A concurrent `start`
    /// waits until both loops have exited.
    pub async fn stop(&self) {
        let mut heartbeat = self.heartbeat.lock().await;
        let Some(running) = heartbeat.take() else {
            tracing::warn!(gateway = %self.inner.name, "Gateway service already stopped");
            return;
        };

        self.inner.connector.stop().await;
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            tracing::error!(gateway = %self.inner.name, error = %e, "Heartbeat task failed");
        }
        tracing::info!(gateway = %self.inner.name, "Gateway service stopped");
    }

    pub async fn register(&self, thing: impl Into<Arc<Thing>>) -> Result<()> {
        self.inner.things.register(thing).await
    }

    pub async fn unregister(&self, thing: &Thing) {
        self.inner.things.unregister(thing).await
    }

    /// Publish device data on the data topic. Best effort, see [`Connector::publish`].
    pub async fn send_data<T: Serialize + ?Sized>(&self, data: &T) {
        self.inner.connector.publish(data).await
    }

    /// Route an inbound action message to the target thing.
    pub async fn dispatch(&self, payload: &Value) -> Result<()> {
        self.inner.things.route(payload).await
    }

    /// Body of the next registration heartbeat.
    pub async fn registration(&self) -> GatewayRegistration {
        self.inner.registration().await
    }

    /// Send a single registration heartbeat.
    pub async fn register_once(&self) -> Result<()> {
        self.inner.register_once().await
    }
}

/// Register now, then once per `interval`, until cancelled.
///
/// Attempts never overlap. Outcomes are logged when they change.
async fn run_heartbeat(inner: Arc<Inner>, interval: Duration, cancel: CancellationToken) {
    let mut tracker = TransitionTracker::new();

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = inner.register_once() => result,
        };

        match result {
            Ok(()) => {
                if tracker.observe(Outcome::Healthy) {
                    tracing::info!(
                        gateway = %inner.name,
                        endpoint = %inner.client.url(),
                        "Gateway service registered"
                    );
                }
            }
            Err(e) => {
                if tracker.observe(Outcome::Failing) {
                    tracing::error!(
                        gateway = %inner.name,
                        endpoint = %inner.client.url(),
                        error = %e,
                        "Failed to register gateway"
                    );
                } else {
                    tracing::debug!(gateway = %inner.name, error = %e, "Registration still failing");
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
