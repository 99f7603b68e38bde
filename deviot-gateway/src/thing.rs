//! Things: descriptive model plus the handlers that implement their actions.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use deviot_common::{Action, Property, ThingModel};
use serde_json::Value;

use crate::error::{Error, HandlerError, Result};

/// Handler invoked for an action.
///
/// Receives the thing it belongs to and one argument per declared parameter,
/// in declaration order, plus the raw payload when the action asks for it.
pub type ActionHandler = Arc<dyn Fn(&Thing, Vec<Value>) -> std::result::Result<(), HandlerError> + Send + Sync>;

/// A device exposed through the gateway.
///
/// Actions are looked up by name in an explicit handler table filled at
/// construction time.
pub struct Thing {
    id: String,
    name: String,
    kind: String,
    properties: RwLock<Vec<Property>>,
    actions: Vec<Action>,
    handlers: HashMap<String, ActionHandler>,
}

impl Thing {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            properties: RwLock::new(Vec::new()),
            actions: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    pub fn with_property(self, property: impl Into<Property>) -> Self {
        self.properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(property.into());
        self
    }

    /// Declare an action together with its handler.
    pub fn with_action<F>(self, action: impl Into<Action>, handler: F) -> Self
    where
        F: Fn(&Thing, Vec<Value>) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        let action = action.into();
        let name = action.name.clone();
        self.declare_action(action).on(name, handler)
    }

    /// Declare an action without a handler. Pair with [`Thing::on`].
    pub fn declare_action(mut self, action: impl Into<Action>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Attach the handler for a declared action.
    pub fn on<F>(mut self, action: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Thing, Vec<Value>) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers.insert(action.into(), Arc::new(handler));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn has_handler(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    /// Current value of every property.
    pub fn properties(&self) -> Vec<Property> {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn property(&self, name: &str) -> Option<Property> {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    /// Update a property's value. The value must fit the property's type.
    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let mut properties = self.properties.write().unwrap_or_else(PoisonError::into_inner);
        let property = properties
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::InvalidArgument(format!("no property {} in thing {}", name, self)))?;

        if !property.kind.accepts(&value) {
            return Err(Error::InvalidArgument(format!(
                "value {} does not fit {} property {} of thing {}",
                value, property.kind, name, self
            )));
        }

        property.value = value;
        Ok(())
    }

    /// Descriptive model announced in the registration heartbeat.
    pub fn model(&self) -> ThingModel {
        ThingModel {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind.clone(),
            properties: self.properties(),
            actions: self.actions.clone(),
        }
    }

    /// Check that the thing honors what it declares: a handler for every
    /// action and no duplicate property or action names.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::InvalidArgument(format!("thing {} has an empty id", self)));
        }

        if let Some(dup) = first_duplicate(self.properties().iter().map(|p| p.name.as_str())) {
            return Err(Error::InvalidArgument(format!(
                "property {} declared twice in thing {}",
                dup, self
            )));
        }

        if let Some(dup) = first_duplicate(self.actions.iter().map(|a| a.name.as_str())) {
            return Err(Error::InvalidArgument(format!(
                "action {} declared twice in thing {}",
                dup, self
            )));
        }

        if let Some(missing) = self.actions.iter().find(|a| !self.handlers.contains_key(&a.name)) {
            return Err(Error::InvalidArgument(format!(
                "thing {} declares action {} but has no handler for it",
                self, missing.name
            )));
        }

        Ok(())
    }

    /// Run the handler for `action` with prepared arguments.
    ///
    /// Handler errors and panics both come back as [`Error::Handler`].
    pub fn invoke(&self, action: &str, args: Vec<Value>) -> Result<()> {
        let handler = self.handlers.get(action).ok_or_else(|| {
            Error::InvalidArgument(format!("no action {} defined in thing {}", action, self))
        })?;

        match catch_unwind(AssertUnwindSafe(|| handler(self, args))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Handler(format!("{}.{}: {}", self, action, e))),
            Err(panic) => Err(Error::Handler(format!(
                "{}.{} panicked: {}",
                self,
                action,
                panic_message(panic.as_ref())
            ))),
        }
    }
}

impl std::fmt::Display for Thing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}({})]", self.id, self.name, self.kind)
    }
}

impl std::fmt::Debug for Thing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thing")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

fn first_duplicate<'a>(names: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = std::collections::HashSet::new();
    names.into_iter().find(|name| !seen.insert(*name))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
