use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config_flow::UserInput;

/// Split one `.env` line into key and value.
///
/// Blank lines and `#` comments yield `None`. Values may contain spaces
/// without quoting; one pair of surrounding quotes is stripped.
fn parse_dotenv_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let mut value = value.trim();
    if key.is_empty() {
        return None;
    }

    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value = &value[1..value.len() - 1];
    }

    Some((key, value))
}

/// Load environment variables from a `.env` file in the working directory.
/// Variables already present in the environment are left alone.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    let Ok(content) = fs::read_to_string(env_path) else {
        return;
    };

    for (key, value) in content.lines().filter_map(parse_dotenv_line) {
        if std::env::var(key).is_err() {
            // SAFETY: called at startup before the async runtime spawns threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub statestream: StatestreamConfig,
    pub store: StoreConfig,
    /// Wizard submission to perform at startup, if both sources are set.
    pub wizard: Option<UserInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatestreamConfig {
    /// Prefix of the upstream statestream tree (`{prefix}/{domain}/{object}/state`).
    pub state_prefix: String,
    /// Prefix under which derived states are published.
    pub publish_prefix: String,
    /// Seconds to wait for retained states before running setup.
    pub settle_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub entries_path: PathBuf,
}

fn default_entries_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dew-point-bridge")
        .join("entries.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig {
                broker_host: "localhost".to_string(),
                broker_port: 1883,
                client_id: "dew-point-bridge".to_string(),
                username: None,
                password: None,
            },
            statestream: StatestreamConfig {
                state_prefix: "homeassistant".to_string(),
                publish_prefix: "dew_point".to_string(),
                settle_secs: 2,
            },
            store: StoreConfig {
                entries_path: default_entries_path(),
            },
            wizard: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source over the defaults.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // MQTT configuration
        if let Some(host) = var("MQTT_BROKER_HOST") {
            config.mqtt.broker_host = host;
        }
        if let Some(port) = var("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            config.mqtt.broker_port = p;
        }
        if let Some(client_id) = var("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }
        if let Some(username) = var("MQTT_USERNAME") {
            config.mqtt.username = Some(username);
        }
        if let Some(password) = var("MQTT_PASSWORD") {
            config.mqtt.password = Some(password);
        }

        // Statestream topics
        if let Some(prefix) = var("STATESTREAM_PREFIX") {
            config.statestream.state_prefix = prefix.trim_end_matches('/').to_string();
        }
        if let Some(prefix) = var("PUBLISH_PREFIX") {
            config.statestream.publish_prefix = prefix.trim_end_matches('/').to_string();
        }
        if let Some(secs) = var("STATE_SETTLE_SECS")
            && let Ok(s) = secs.parse()
        {
            config.statestream.settle_secs = s;
        }

        if let Some(path) = var("ENTRY_STORE_PATH") {
            config.store.entries_path = PathBuf::from(path);
        }

        if let (Some(temperature), Some(humidity)) = (
            var("DEW_POINT_TEMPERATURE_SENSOR"),
            var("DEW_POINT_HUMIDITY_SENSOR"),
        ) {
            let mut input = UserInput::new(temperature, humidity);
            input.dew_point_name = var("DEW_POINT_NAME");
            config.wizard = Some(input);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_parse_dotenv_line() {
        assert_eq!(parse_dotenv_line("A=1"), Some(("A", "1")));
        assert_eq!(
            parse_dotenv_line("  DEW_POINT_NAME = Cellar Dew Point "),
            Some(("DEW_POINT_NAME", "Cellar Dew Point"))
        );
        assert_eq!(parse_dotenv_line("B=\"quoted value\""), Some(("B", "quoted value")));
        assert_eq!(parse_dotenv_line("C='x'"), Some(("C", "x")));
        assert_eq!(parse_dotenv_line("D=\""), Some(("D", "\"")));
        assert_eq!(parse_dotenv_line("# comment"), None);
        assert_eq!(parse_dotenv_line(""), None);
        assert_eq!(parse_dotenv_line("no_equals"), None);
        assert_eq!(parse_dotenv_line("=value"), None);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.statestream.state_prefix, "homeassistant");
        assert_eq!(config.statestream.publish_prefix, "dew_point");
        assert!(config.store.entries_path.ends_with("dew-point-bridge/entries.json"));
        assert!(config.wizard.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("MQTT_BROKER_HOST", "broker.lan"),
            ("MQTT_BROKER_PORT", "8883"),
            ("STATESTREAM_PREFIX", "ha/"),
            ("STATE_SETTLE_SECS", "not a number"),
            ("ENTRY_STORE_PATH", "/var/lib/dew/entries.json"),
        ]));
        assert_eq!(config.mqtt.broker_host, "broker.lan");
        assert_eq!(config.mqtt.broker_port, 8883);
        assert_eq!(config.statestream.state_prefix, "ha");
        assert_eq!(config.statestream.settle_secs, 2);
        assert_eq!(
            config.store.entries_path,
            PathBuf::from("/var/lib/dew/entries.json")
        );
    }

    #[test]
    fn test_wizard_needs_both_sensors() {
        let only_one = Config::from_lookup(lookup(&[("DEW_POINT_TEMPERATURE_SENSOR", "sensor.t")]));
        assert!(only_one.wizard.is_none());

        let both = Config::from_lookup(lookup(&[
            ("DEW_POINT_TEMPERATURE_SENSOR", "sensor.t"),
            ("DEW_POINT_HUMIDITY_SENSOR", "sensor.h"),
            ("DEW_POINT_NAME", "Cellar"),
        ]));
        assert_eq!(
            both.wizard,
            Some(UserInput::new("sensor.t", "sensor.h").with_name("Cellar"))
        );
    }
}
