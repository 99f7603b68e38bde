//! Descriptive model of things: properties, actions and the thing itself.
//!
//! These are the shapes announced to the cloud in every registration
//! heartbeat. They carry no behavior; handlers live with the gateway.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value type of a property.
///
/// Serialized as its numeric tag (`0` int, `1` string, `2` bool, `3` color),
/// which is what the registration endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PropertyType {
    #[default]
    Int,
    String,
    Bool,
    /// Hex RGB string such as `"FF0000"`.
    Color,
}

impl PropertyType {
    /// All property types for iteration.
    pub const ALL: [PropertyType; 4] = [
        PropertyType::Int,
        PropertyType::String,
        PropertyType::Bool,
        PropertyType::Color,
    ];

    /// Zero value for this type.
    pub fn default_value(self) -> Value {
        match self {
            PropertyType::Int => Value::from(0),
            PropertyType::String => Value::from(""),
            PropertyType::Bool => Value::from(false),
            PropertyType::Color => Value::from("FFFFFF"),
        }
    }

    /// Whether `value` is acceptable for a property of this type.
    ///
    /// `null` is accepted for every type (value not yet known).
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (PropertyType::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (PropertyType::String, Value::String(_)) => true,
            (PropertyType::Bool, Value::Bool(_)) => true,
            (PropertyType::Color, Value::String(s)) => is_hex_color(s),
            _ => false,
        }
    }
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 6 && s.chars().all(|c| c.is_ascii_hexdigit())
}

impl From<PropertyType> for u8 {
    fn from(kind: PropertyType) -> Self {
        match kind {
            PropertyType::Int => 0,
            PropertyType::String => 1,
            PropertyType::Bool => 2,
            PropertyType::Color => 3,
        }
    }
}

impl TryFrom<u8> for PropertyType {
    type Error = String;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(PropertyType::Int),
            1 => Ok(PropertyType::String),
            2 => Ok(PropertyType::Bool),
            3 => Ok(PropertyType::Color),
            other => Err(format!("unknown property type tag {}", other)),
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyType::Int => write!(f, "int"),
            PropertyType::String => write!(f, "string"),
            PropertyType::Bool => write!(f, "bool"),
            PropertyType::Color => write!(f, "color"),
        }
    }
}

/// A typed, optionally ranged value describing thing state or an action parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Unique within the owning thing or action.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    pub value: Value,
    /// Optional bounds; interpretation depends on `kind` (e.g. `[0, 100]`).
    #[serde(default)]
    pub range: Option<Value>,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
}

impl Property {
    /// Create a property holding the zero value of its type.
    pub fn new(name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
            value: kind.default_value(),
            range: None,
            unit: String::new(),
            description: String::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_range(mut self, range: impl Into<Value>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A bare name declares an int property.
impl From<&str> for Property {
    fn from(name: &str) -> Self {
        Property::new(name, PropertyType::Int)
    }
}

impl From<String> for Property {
    fn from(name: String) -> Self {
        Property::new(name, PropertyType::Int)
    }
}

/// A named operation a thing supports.
///
/// Parameter order is call-argument order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Property>,
    /// Append the raw `payload` field of the inbound message as a final argument.
    ///
    /// Local to the gateway; not part of the announced model.
    #[serde(skip)]
    pub need_payload: bool,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            need_payload: false,
        }
    }

    pub fn with_parameter(mut self, parameter: impl Into<Property>) -> Self {
        self.parameters.push(parameter.into());
        self
    }

    pub fn with_payload(mut self) -> Self {
        self.need_payload = true;
        self
    }

    /// Number of arguments a handler for this action receives.
    pub fn arity(&self) -> usize {
        self.parameters.len() + usize::from(self.need_payload)
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Action::new(name)
    }
}

/// Descriptive model of a registered thing, as sent in the `sensors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingModel {
    pub id: String,
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_type_serializes_as_tag() {
        assert_eq!(serde_json::to_string(&PropertyType::Color).unwrap(), "3");
        let parsed: PropertyType = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, PropertyType::Bool);
        assert!(serde_json::from_str::<PropertyType>("9").is_err());
    }

    #[test]
    fn test_default_values() {
        assert_eq!(PropertyType::Int.default_value(), json!(0));
        assert_eq!(PropertyType::String.default_value(), json!(""));
        assert_eq!(PropertyType::Bool.default_value(), json!(false));
        assert_eq!(PropertyType::Color.default_value(), json!("FFFFFF"));
    }

    #[test]
    fn test_accepts() {
        assert!(PropertyType::Int.accepts(&json!(42)));
        assert!(!PropertyType::Int.accepts(&json!(1.5)));
        assert!(PropertyType::Color.accepts(&json!("ff00aa")));
        assert!(!PropertyType::Color.accepts(&json!("red")));
        assert!(PropertyType::Bool.accepts(&Value::Null));
        assert!(!PropertyType::String.accepts(&json!(true)));
    }

    #[test]
    fn test_property_model_shape() {
        let prop = Property::new("temperature", PropertyType::Int)
            .with_value(21)
            .with_unit("C")
            .with_range(json!([-40, 125]));
        let value = serde_json::to_value(&prop).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "temperature",
                "type": 0,
                "value": 21,
                "range": [-40, 125],
                "unit": "C",
                "description": ""
            })
        );
    }

    #[test]
    fn test_property_without_range_serializes_null() {
        let value = serde_json::to_value(Property::from("level")).unwrap();
        assert_eq!(value["range"], Value::Null);
        assert_eq!(value["value"], json!(0));
    }

    #[test]
    fn test_action_model_omits_need_payload() {
        let action = Action::new("setColor")
            .with_parameter(Property::new("color", PropertyType::Color))
            .with_payload();
        assert_eq!(action.arity(), 2);

        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["name"], "setColor");
        assert_eq!(value["parameters"][0]["name"], "color");
        assert!(value.get("need_payload").is_none());
    }
}
