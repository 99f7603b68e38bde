//! Wire types exchanged with the DevIoT cloud.
//!
//! # Registration
//!
//! While active, a gateway POSTs a [`GatewayRegistration`] to the registration
//! endpoint at a fixed interval. Any status below 300 counts as registered.
//!
//! # Action messages
//!
//! Inbound invocations arrive on the gateway's action topic as a JSON object:
//!
//! ```json
//! {"name": "bulb1", "action": "setColor", "color": "FF0000", "payload": "..."}
//! ```
//!
//! `name` is the target thing id and `action` the action name; remaining keys
//! are matched against the action's declared parameters by name. `payload` is
//! consumed only by actions that ask for the raw payload.

use serde::{Deserialize, Serialize};

use crate::thing::ThingModel;

/// Default path of the registration endpoint.
pub const REGISTRATION_PATH: &str = "/api/v1/gateways";

/// Key of the target thing id in an action message.
pub const THING_KEY: &str = "name";
/// Key of the action name in an action message.
pub const ACTION_KEY: &str = "action";
/// Key of the raw payload in an action message.
pub const PAYLOAD_KEY: &str = "payload";

/// How the cloud talks to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TransportMode {
    HttpPull,
    HttpPush,
    Mqtt,
}

impl From<TransportMode> for u8 {
    fn from(mode: TransportMode) -> Self {
        match mode {
            TransportMode::HttpPull => 0,
            TransportMode::HttpPush => 1,
            TransportMode::Mqtt => 2,
        }
    }
}

impl TryFrom<u8> for TransportMode {
    type Error = String;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(TransportMode::HttpPull),
            1 => Ok(TransportMode::HttpPush),
            2 => Ok(TransportMode::Mqtt),
            other => Err(format!("unknown transport mode {}", other)),
        }
    }
}

/// Registration heartbeat body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRegistration {
    pub name: String,
    pub kind: String,
    /// Account identifier; may be empty.
    pub owner: String,
    /// Broker host the cloud should use to reach the gateway.
    pub host: String,
    pub port: u16,
    pub mode: TransportMode,
    /// Topic the gateway publishes device data on.
    pub data: String,
    /// Topic the gateway listens for actions on.
    pub action: String,
    pub sensors: Vec<ThingModel>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_mode_tags() {
        assert_eq!(serde_json::to_string(&TransportMode::HttpPull).unwrap(), "0");
        assert_eq!(serde_json::to_string(&TransportMode::Mqtt).unwrap(), "2");
        let parsed: TransportMode = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, TransportMode::HttpPush);
    }

    #[test]
    fn test_registration_serialization() {
        let reg = GatewayRegistration {
            name: "hub".to_string(),
            kind: "device".to_string(),
            owner: "".to_string(),
            host: "broker.local".to_string(),
            port: 1883,
            mode: TransportMode::Mqtt,
            data: "/deviot/_/hub/data".to_string(),
            action: "/deviot/_/hub/action".to_string(),
            sensors: vec![ThingModel {
                id: "bulb1".to_string(),
                name: "Bulb".to_string(),
                kind: "light".to_string(),
                properties: vec![],
                actions: vec![],
            }],
        };

        let value = serde_json::to_value(&reg).unwrap();
        assert_eq!(value["mode"], json!(2));
        assert_eq!(value["port"], json!(1883));
        assert_eq!(value["sensors"][0]["id"], "bulb1");
        assert_eq!(value["sensors"][0]["properties"], json!([]));
    }
}
