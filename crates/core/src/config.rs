use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{CaptureError, CaptureResult};
use crate::types::EventClass;

/// Root configuration. Loaded once at startup from an optional config file and
/// environment variables with the prefix `INTERACTION_CAPTURE__`, then passed
/// by reference; nothing reads ambient state after that.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub capture: CaptureSettings,
}

/// Collector connection identity and reconnect tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port", deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    #[serde(
        default = "default_reconnect_interval_ms",
        alias = "reconnectInterval",
        alias = "reconnect_interval"
    )]
    pub reconnect_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Ws,
    Wss,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Ws => "ws",
            Protocol::Wss => "wss",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureSettings {
    #[serde(default = "default_tracked")]
    pub tracked: Vec<EventClass>,
    #[serde(default)]
    pub wheel_mode: WheelMode,
    #[serde(default = "default_wheel_quiet_period_ms")]
    pub wheel_quiet_period_ms: u64,
    #[serde(default)]
    pub sink: SinkKind,
}

/// How wheel events reach the sink.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WheelMode {
    /// Bursts are debounced into one record per quiet period.
    #[default]
    Coalesced,
    /// One record per raw wheel event.
    Raw,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Websocket,
    Console,
}

// Default functions
fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    8765
}
fn default_reconnect_interval_ms() -> u64 {
    5000
}
fn default_tracked() -> Vec<EventClass> {
    vec![
        EventClass::Input,
        EventClass::Click,
        EventClass::Enter,
        EventClass::Wheel,
    ]
}
fn default_wheel_quiet_period_ms() -> u64 {
    500
}

/// Page globals tend to carry the port as a string; accept both forms.
fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u16),
        Text(String),
    }

    match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(port) => Ok(port),
        PortRepr::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port {text:?}"))),
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            host: default_host(),
            port: default_port(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            tracked: default_tracked(),
            wheel_mode: WheelMode::default(),
            wheel_quiet_period_ms: default_wheel_quiet_period_ms(),
            sink: SinkKind::default(),
        }
    }
}

impl TransportConfig {
    /// Read the connection settings from a page-supplied namespace object such
    /// as `{"host": "10.0.0.2", "port": "9000", "reconnectInterval": 1000}`.
    /// Missing fields take their defaults; `null` means "not supplied".
    pub fn from_namespace(namespace: &serde_json::Value) -> CaptureResult<Self> {
        match namespace {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::Object(map) => {
                let supplied: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                serde_json::from_value(serde_json::Value::Object(supplied))
                    .map_err(|e| CaptureError::Config(format!("invalid namespace: {e}")))
            }
            other => Err(CaptureError::Config(format!(
                "namespace must be an object, got {other}"
            ))),
        }
    }

    /// `protocol://host:port`
    pub fn url(&self) -> CaptureResult<url::Url> {
        let raw = format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port);
        url::Url::parse(&raw).map_err(|e| CaptureError::Config(format!("bad collector url {raw}: {e}")))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl CaptureSettings {
    pub fn wheel_quiet_period(&self) -> Duration {
        Duration::from_millis(self.wheel_quiet_period_ms)
    }

    pub fn is_tracked(&self, class: EventClass) -> bool {
        self.tracked.contains(&class)
    }
}

impl CaptureConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> CaptureResult<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an optional file, overridden by environment
    /// variables (`INTERACTION_CAPTURE__TRANSPORT__PORT=9000`).
    pub fn load_from(path: Option<&Path>) -> CaptureResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "loading capture config file");
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("INTERACTION_CAPTURE")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("capture.tracked"),
        );

        let config = builder.build()?;
        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> CaptureResult<()> {
        if self.transport.host.trim().is_empty() {
            return Err(CaptureError::Config("transport.host must not be empty".into()));
        }
        if self.transport.reconnect_interval_ms == 0 {
            return Err(CaptureError::Config(
                "transport.reconnect_interval_ms must be positive".into(),
            ));
        }
        self.transport.url()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.transport.protocol, Protocol::Ws);
        assert_eq!(config.transport.host, "localhost");
        assert_eq!(config.transport.port, 8765);
        assert_eq!(config.transport.reconnect_interval(), Duration::from_secs(5));
        assert_eq!(config.transport.url().unwrap().as_str(), "ws://localhost:8765/");
        assert_eq!(config.capture.wheel_mode, WheelMode::Coalesced);
        assert_eq!(config.capture.wheel_quiet_period(), Duration::from_millis(500));
        assert!(config.capture.is_tracked(EventClass::Enter));
        assert!(!config.capture.is_tracked(EventClass::MouseMove));
        config.validate().unwrap();
    }

    #[test]
    fn test_namespace_partial_override() {
        let ns = serde_json::json!({
            "protocol": "wss",
            "port": "9443",
            "reconnectInterval": 250,
            "host": null
        });
        let transport = TransportConfig::from_namespace(&ns).unwrap();
        assert_eq!(transport.protocol, Protocol::Wss);
        assert_eq!(transport.port, 9443);
        assert_eq!(transport.host, "localhost");
        assert_eq!(transport.reconnect_interval_ms, 250);
        assert_eq!(transport.url().unwrap().as_str(), "wss://localhost:9443/");
    }

    #[test]
    fn test_namespace_absent_uses_defaults() {
        let transport = TransportConfig::from_namespace(&serde_json::Value::Null).unwrap();
        assert_eq!(transport.port, 8765);
    }

    #[test]
    fn test_namespace_rejects_garbage() {
        assert!(TransportConfig::from_namespace(&serde_json::json!("ws://x")).is_err());
        assert!(TransportConfig::from_namespace(&serde_json::json!({"port": "http"})).is_err());
        assert!(TransportConfig::from_namespace(&serde_json::json!({"protocol": "tcp"})).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = CaptureConfig::default();
        config.transport.reconnect_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
