//! Registry of things exposed by the gateway, and routing of inbound actions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use deviot_common::protocol::{ACTION_KEY, PAYLOAD_KEY, THING_KEY};
use deviot_common::ThingModel;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::connector::ActionDispatcher;
use crate::error::{Error, Result};
use crate::thing::Thing;

/// Things registered with the gateway, keyed by id.
pub struct ThingRegistry {
    things: RwLock<HashMap<String, Arc<Thing>>>,
}

impl ThingRegistry {
    pub fn new() -> Self {
        Self {
            things: RwLock::new(HashMap::new()),
        }
    }

    /// Register a thing.
    ///
    /// Fails if the thing does not honor its declared actions. Registering an
    /// id that is already present logs a warning and keeps the existing entry.
    pub async fn register(&self, thing: impl Into<Arc<Thing>>) -> Result<()> {
        let thing = thing.into();
        thing.validate()?;

        let mut things = self.things.write().await;
        if things.contains_key(thing.id()) {
            tracing::warn!(thing = %thing, "Thing is already registered");
        } else {
            tracing::info!(thing = %thing, "Thing registered");
            things.insert(thing.id().to_string(), thing);
        }
        Ok(())
    }

    /// Remove a thing by id. Logs a warning if it was not registered.
    pub async fn unregister(&self, thing: &Thing) {
        let mut things = self.things.write().await;
        if things.remove(thing.id()).is_some() {
            tracing::info!(thing = %thing, "Thing unregistered");
        } else {
            tracing::warn!(thing = %thing, "Thing is not registered");
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Thing>> {
        let things = self.things.read().await;
        things.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.things.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.things.read().await.is_empty()
    }

    /// Descriptive model of every registered thing.
    pub async fn snapshot(&self) -> Vec<ThingModel> {
        // Clone handles so property locks are not taken under the map lock
        let things: Vec<Arc<Thing>> = {
            let guard = self.things.read().await;
            guard.values().cloned().collect()
        };
        things.iter().map(|t| t.model()).collect()
    }

    /// Route an inbound action message to the target thing's handler.
    ///
    /// The message must carry the thing id under `name` and the action under
    /// `action`. Each declared parameter is read from the key of the same
    /// name (`null` when absent); actions that need the raw payload get the
    /// `payload` value appended last.
    pub async fn route(&self, payload: &Value) -> Result<()> {
        let message = payload
            .as_object()
            .ok_or_else(|| Error::InvalidArgument(format!("action message is not an object: {}", payload)))?;

        let thing_id = message.get(THING_KEY).and_then(Value::as_str);
        let action_name = message.get(ACTION_KEY).and_then(Value::as_str);

        let (thing_id, action_name) = match (thing_id, action_name) {
            (Some(thing_id), Some(action_name)) => (thing_id, action_name),
            (None, _) => {
                return Err(Error::InvalidArgument(format!(
                    "action message has no thing name: {}",
                    payload
                )))
            }
            (_, None) => {
                return Err(Error::InvalidArgument(format!(
                    "action message has no action: {}",
                    payload
                )))
            }
        };

        let thing = self
            .get(thing_id)
            .await
            .ok_or_else(|| Error::InvalidArgument(format!("thing {} is not registered", thing_id)))?;

        let action = match thing.action(action_name) {
            Some(action) if thing.has_handler(action_name) => action,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "no action {} defined in thing {}",
                    action_name, thing
                )))
            }
        };

        let mut args: Vec<Value> = action
            .parameters
            .iter()
            .map(|p| message.get(&p.name).cloned().unwrap_or(Value::Null))
            .collect();
        if action.need_payload {
            args.push(message.get(PAYLOAD_KEY).cloned().unwrap_or(Value::Null));
        }

        thing.invoke(action_name, args)?;
        tracing::info!(thing = %thing, action = action_name, payload = %payload, "Action called");
        Ok(())
    }
}

impl Default for ThingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionDispatcher for ThingRegistry {
    async fn dispatch(&self, payload: Value) -> Result<()> {
        self.route(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deviot_common::{Action, Property, PropertyType};
    use serde_json::json;
    use std::sync::Mutex;

    type Calls = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

    fn recording_bulb(id: &str, calls: Calls) -> Thing {
        let set_color = calls.clone();
        let upload = calls;
        Thing::new(id, "Bulb", "light")
            .with_property(Property::new("color", PropertyType::Color))
            .with_action(
                Action::new("setColor").with_parameter(Property::new("color", PropertyType::Color)),
                move |_, args| {
                    set_color.lock().unwrap().push(("setColor".to_string(), args));
                    Ok(())
                },
            )
            .with_action(
                Action::new("upload")
                    .with_parameter(Property::new("slot", PropertyType::Int))
                    .with_payload(),
                move |_, args| {
                    upload.lock().unwrap().push(("upload".to_string(), args));
                    Ok(())
                },
            )
    }

    #[tokio::test]
    async fn test_register_twice_keeps_one_entry() {
        let registry = ThingRegistry::new();
        let calls = Calls::default();
        registry.register(recording_bulb("bulb1", calls.clone())).await.unwrap();
        registry.register(recording_bulb("bulb1", calls)).await.unwrap();
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_rejects_thing_without_handler() {
        let registry = ThingRegistry::new();
        let thing = Thing::new("switch1", "Switch", "switch").declare_action("toggle");
        assert!(matches!(
            registry.register(thing).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unregister_absent_is_noop() {
        let registry = ThingRegistry::new();
        registry
            .register(recording_bulb("bulb1", Calls::default()))
            .await
            .unwrap();
        let other = Thing::new("ghost", "Ghost", "none");
        registry.unregister(&other).await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.get("bulb1").await.is_some());
    }

    #[tokio::test]
    async fn test_unregister_removes() {
        let registry = ThingRegistry::new();
        let thing = Arc::new(recording_bulb("bulb1", Calls::default()));
        registry.register(thing.clone()).await.unwrap();
        registry.unregister(&thing).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot() {
        let registry = ThingRegistry::new();
        registry
            .register(recording_bulb("bulb1", Calls::default()))
            .await
            .unwrap();
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "bulb1");
        assert_eq!(snapshot[0].actions.len(), 2);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_route_calls_handler_with_parameters() {
        let registry = ThingRegistry::new();
        let calls = Calls::default();
        registry.register(recording_bulb("bulb1", calls.clone())).await.unwrap();

        registry
            .route(&json!({"name": "bulb1", "action": "setColor", "color": "FF0000"}))
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("setColor".to_string(), vec![json!("FF0000")]));
    }

    #[tokio::test]
    async fn test_route_missing_parameter_is_null() {
        let registry = ThingRegistry::new();
        let calls = Calls::default();
        registry.register(recording_bulb("bulb1", calls.clone())).await.unwrap();

        registry
            .route(&json!({"name": "bulb1", "action": "setColor"}))
            .await
            .unwrap();

        assert_eq!(calls.lock().unwrap()[0].1, vec![Value::Null]);
    }

    #[tokio::test]
    async fn test_route_appends_payload() {
        let registry = ThingRegistry::new();
        let calls = Calls::default();
        registry.register(recording_bulb("bulb1", calls.clone())).await.unwrap();

        registry
            .route(&json!({"name": "bulb1", "action": "upload", "slot": 3, "payload": {"raw": [1, 2]}}))
            .await
            .unwrap();
        registry
            .route(&json!({"name": "bulb1", "action": "upload", "slot": 4}))
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].1, vec![json!(3), json!({"raw": [1, 2]})]);
        assert_eq!(calls[1].1, vec![json!(4), Value::Null]);
    }

    #[tokio::test]
    async fn test_route_unregistered_thing() {
        let registry = ThingRegistry::new();
        let calls = Calls::default();
        registry.register(recording_bulb("bulb1", calls.clone())).await.unwrap();

        let result = registry
            .route(&json!({"name": "bulb2", "action": "setColor", "color": "FF0000"}))
            .await;

        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(registry.len().await, 1);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_route_rejects_malformed_messages() {
        let registry = ThingRegistry::new();
        registry
            .register(recording_bulb("bulb1", Calls::default()))
            .await
            .unwrap();

        for payload in [
            json!({"name": "bulb1"}),
            json!({"action": "setColor"}),
            json!({"name": "bulb1", "action": "dance"}),
            json!({"name": 7, "action": "setColor"}),
            json!(["bulb1", "setColor"]),
        ] {
            assert!(
                matches!(registry.route(&payload).await, Err(Error::InvalidArgument(_))),
                "expected rejection of {}",
                payload
            );
        }
    }
}
