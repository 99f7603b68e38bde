//! Configuration for the gateway daemon.

use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use deviot_common::protocol::REGISTRATION_PATH;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub registration: RegistrationConfig,
    pub broker: BrokerConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Identity announced to the cloud.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub name: String,
    /// Account identifier (may be empty).
    #[serde(default)]
    pub owner: String,
    #[serde(default = "default_kind")]
    pub kind: String,
}

/// Registration heartbeat configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfig {
    /// Base URL of the registration server, e.g. `http://deviot.example.com:9000`.
    pub endpoint: String,
    #[serde(default = "default_registration_path")]
    pub path: String,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Applied to both connecting and reading the response.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl RegistrationConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            path: default_registration_path(),
            interval_secs: default_interval(),
            timeout_secs: default_timeout(),
        }
    }

    /// Full URL the heartbeat is POSTed to.
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// MQTT broker connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// `mqtt://host:port`, `tcp://host:port` or bare `host[:port]`.
    pub url: String,
    /// Generated from the gateway name when absent.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_timeout")]
    pub connect_timeout_secs: u64,
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_base")]
    pub base_secs: u64,
    #[serde(default = "default_backoff_max")]
    pub max_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_secs: default_backoff_base(),
            max_secs: default_backoff_max(),
        }
    }
}

/// Host and port of the broker, parsed from [`BrokerConfig::url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    pub const DEFAULT_PORT: u16 = 1883;

    pub fn parse(url: &str) -> Result<Self> {
        let with_scheme = if url.contains("://") {
            url.to_string()
        } else {
            format!("mqtt://{}", url)
        };

        let parsed = reqwest::Url::parse(&with_scheme)
            .map_err(|e| Error::Config(format!("invalid broker url '{}': {}", url, e)))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Config(format!("broker url '{}' has no host", url)))?;

        Ok(Self {
            host: host.to_string(),
            port: parsed.port().unwrap_or(Self::DEFAULT_PORT),
        })
    }
}

impl std::fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// Default values
fn default_kind() -> String {
    "device".to_string()
}
fn default_registration_path() -> String {
    REGISTRATION_PATH.to_string()
}
fn default_interval() -> u64 {
    100
}
fn default_timeout() -> u64 {
    10
}
fn default_keep_alive() -> u64 {
    30
}
fn default_backoff_base() -> u64 {
    2
}
fn default_backoff_max() -> u64 {
    128
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (DEVIOT__SECTION__KEY format)
    /// 2. The file at `path`, or `deviot.toml` if present
    /// 3. Built-in defaults
    ///
    /// Fails with [`Error::Config`] when a source cannot be read or the
    /// resulting values are unusable.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name("deviot").required(false),
        };

        let config = ConfigLoader::builder()
            .set_default("gateway.kind", default_kind())?
            .set_default("registration.interval_secs", default_interval() as i64)?
            .set_default("backoff.base_secs", default_backoff_base() as i64)?
            .set_default("backoff.max_secs", default_backoff_max() as i64)?
            .add_source(file)
            .add_source(
                Environment::with_prefix("DEVIOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject intervals that would stall or spin the background loops.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("registration.interval_secs", self.registration.interval_secs),
            ("registration.timeout_secs", self.registration.timeout_secs),
            ("broker.connect_timeout_secs", self.broker.connect_timeout_secs),
            ("backoff.base_secs", self.backoff.base_secs),
            ("backoff.max_secs", self.backoff.max_secs),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{} must be greater than zero", key)));
        }

        if self.backoff.base_secs > self.backoff.max_secs {
            return Err(Error::Config(format!(
                "backoff.base_secs ({}) exceeds backoff.max_secs ({})",
                self.backoff.base_secs, self.backoff.max_secs
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_backoff_config() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.base_secs, 2);
        assert_eq!(backoff.max_secs, 128);
    }

    #[test]
    fn test_registration_url_joins_path() {
        let reg = RegistrationConfig::new("http://cloud.local:9000/");
        assert_eq!(reg.url(), "http://cloud.local:9000/api/v1/gateways");
        assert_eq!(reg.interval(), Duration::from_secs(100));
        assert_eq!(reg.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_broker_address_parse() {
        let addr = BrokerAddress::parse("mqtt://broker.local:1884").unwrap();
        assert_eq!(addr.host, "broker.local");
        assert_eq!(addr.port, 1884);

        let addr = BrokerAddress::parse("tcp://10.0.0.5").unwrap();
        assert_eq!(addr.port, 1883);

        let addr = BrokerAddress::parse("localhost:2883").unwrap();
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, 2883);
        assert_eq!(addr.to_string(), "localhost:2883");
    }

    #[test]
    fn test_broker_address_rejects_garbage() {
        assert!(matches!(
            BrokerAddress::parse("mqtt://:1883"),
            Err(Error::Config(_))
        ));
    }

    fn write_config(extra: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[gateway]
name = "hub"

[broker]
url = "mqtt://broker.local"

{}
"#,
            extra
        )
        .unwrap();
        file
    }

    #[test]
    fn test_load_rejects_zero_interval() {
        let file = write_config(
            "[registration]\nendpoint = \"http://cloud.local\"\ninterval_secs = 0",
        );
        let err = Config::load(file.path().to_str()).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("registration.interval_secs")));
    }

    #[test]
    fn test_load_rejects_zero_backoff_base() {
        let file = write_config(
            "[registration]\nendpoint = \"http://cloud.local\"\n\n[backoff]\nbase_secs = 0",
        );
        let err = Config::load(file.path().to_str()).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("backoff.base_secs")));
    }

    #[test]
    fn test_load_rejects_base_above_max() {
        let file = write_config(
            "[registration]\nendpoint = \"http://cloud.local\"\n\n[backoff]\nbase_secs = 10\nmax_secs = 5",
        );
        let err = Config::load(file.path().to_str()).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("exceeds")));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[gateway]
name = "hub"
owner = "alice@example.com"

[registration]
endpoint = "http://cloud.local:9000"

[broker]
url = "mqtt://broker.local"
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.gateway.name, "hub");
        assert_eq!(config.gateway.kind, "device");
        assert_eq!(config.registration.interval_secs, 100);
        assert_eq!(config.registration.path, "/api/v1/gateways");
        assert_eq!(config.broker.keep_alive_secs, 30);
        assert!(config.broker.client_id.is_none());
        assert_eq!(config.backoff.max_secs, 128);
    }
}
