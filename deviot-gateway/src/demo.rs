//! A light bulb used by the binary to exercise the gateway end to end.

use deviot_common::{Action, Property, PropertyType};
use serde_json::{Map, Value};

use crate::error::HandlerError;
use crate::thing::Thing;

pub const LIGHT: &str = "light";
pub const COLOR: &str = "color";

/// Build a bulb with `setColor(color)`, `turnOn()` and `turnOff()`.
pub fn light_bulb(id: &str, name: &str) -> Thing {
    Thing::new(id, name, "light")
        .with_property(Property::new(LIGHT, PropertyType::Bool).with_value(false))
        .with_property(Property::new(COLOR, PropertyType::Color).with_value("ffffff"))
        .with_action(
            Action::new("setColor").with_parameter(Property::new(COLOR, PropertyType::Color)),
            set_color,
        )
        .with_action("turnOn", |bulb, _| switch(bulb, true))
        .with_action("turnOff", |bulb, _| switch(bulb, false))
}

fn set_color(bulb: &Thing, args: Vec<Value>) -> Result<(), HandlerError> {
    let color = args.into_iter().next().unwrap_or(Value::Null);
    if color.is_null() {
        return Err("setColor needs a color".into());
    }
    bulb.set_property(COLOR, color)?;
    tracing::info!(thing = %bulb, color = ?bulb.property(COLOR).map(|p| p.value), "Color changed");
    Ok(())
}

fn switch(bulb: &Thing, on: bool) -> Result<(), HandlerError> {
    bulb.set_property(LIGHT, on)?;
    tracing::info!(thing = %bulb, on, "Light switched");
    Ok(())
}

/// Current property values of `thing`, keyed by its id.
pub fn state(thing: &Thing) -> Value {
    let properties: Map<String, Value> = thing
        .properties()
        .into_iter()
        .map(|p| (p.name, p.value))
        .collect();

    let mut data = Map::new();
    data.insert(thing.id().to_string(), Value::Object(properties));
    Value::Object(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    #[test]
    fn test_bulb_is_valid() {
        let bulb = light_bulb("bulb1", "Bulb");
        bulb.validate().unwrap();
        assert_eq!(bulb.actions().len(), 3);
        assert_eq!(bulb.action("setColor").unwrap().arity(), 1);
    }

    #[test]
    fn test_turn_on_and_off() {
        let bulb = light_bulb("bulb1", "Bulb");
        bulb.invoke("turnOn", vec![]).unwrap();
        assert_eq!(bulb.property(LIGHT).unwrap().value, json!(true));
        bulb.invoke("turnOff", vec![]).unwrap();
        assert_eq!(bulb.property(LIGHT).unwrap().value, json!(false));
    }

    #[test]
    fn test_set_color() {
        let bulb = light_bulb("bulb1", "Bulb");
        bulb.invoke("setColor", vec![json!("ff0000")]).unwrap();
        assert_eq!(state(&bulb), json!({"bulb1": {"light": false, "color": "ff0000"}}));
    }

    #[test]
    fn test_set_color_rejects_bad_values() {
        let bulb = light_bulb("bulb1", "Bulb");
        assert!(matches!(bulb.invoke("setColor", vec![Value::Null]), Err(Error::Handler(_))));
        assert!(matches!(bulb.invoke("setColor", vec![json!("red")]), Err(Error::Handler(_))));
        assert_eq!(bulb.property(COLOR).unwrap().value, json!("ffffff"));
    }
}
