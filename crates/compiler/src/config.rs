//! System configuration: the YAML document recognized options beyond the
//! rule files themselves (cycle timing, buffer sizing, depth limits, and an
//! opaque store configuration block passed straight through to the adapter).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

fn default_version() -> u32 {
    3
}

fn default_cycle_time_ms() -> u64 {
    1_000
}

fn default_buffer_capacity() -> usize {
    64
}

fn default_max_dependency_depth() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `temporalMode` block: only `extendedLastKnown` is currently defined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalMode {
    /// When true, `use_last_known` ignores `max_age` entirely and always
    /// accepts the latest known sample, however stale.
    #[serde(default)]
    pub extended_last_known: bool,
}

/// Top-level system configuration document.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Sensor whitelist; when absent, the sensor catalog is auto-derived
    /// from the rules referencing it.
    #[serde(default)]
    pub valid_sensors: Option<Vec<String>>,

    #[serde(default = "default_cycle_time_ms")]
    pub cycle_time: u64,

    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default = "default_max_dependency_depth")]
    pub max_dependency_depth: u32,

    #[serde(default)]
    pub temporal_mode: TemporalMode,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Opaque store configuration, forwarded to whichever `Store` adapter
    /// is wired up; the compiler never interprets it.
    #[serde(default)]
    pub store: JsonValue,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            valid_sensors: None,
            cycle_time: default_cycle_time_ms(),
            buffer_capacity: default_buffer_capacity(),
            max_dependency_depth: default_max_dependency_depth(),
            temporal_mode: TemporalMode::default(),
            log_level: default_log_level(),
            store: JsonValue::Null,
        }
    }
}

impl SystemConfig {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = SystemConfig::default();
        assert_eq!(config.version, 3);
        assert_eq!(config.cycle_time, 1_000);
        assert_eq!(config.buffer_capacity, 64);
        assert_eq!(config.max_dependency_depth, 10);
        assert!(!config.temporal_mode.extended_last_known);
        assert_eq!(config.log_level, "info");
        assert!(config.valid_sensors.is_none());
    }

    #[test]
    fn parses_a_minimal_document_applying_defaults() {
        let config = SystemConfig::from_yaml("version: 3\ncycleTime: 500\n").unwrap();
        assert_eq!(config.cycle_time, 500);
        assert_eq!(config.max_dependency_depth, 10);
    }

    #[test]
    fn parses_full_document() {
        let yaml = r#"
version: 3
validSensors: [temperature, humidity]
cycleTime: 250
bufferCapacity: 128
maxDependencyDepth: 5
temporalMode:
  extendedLastKnown: true
logLevel: debug
store:
  kind: redis
  url: redis://localhost
"#;
        let config = SystemConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.valid_sensors, Some(vec!["temperature".to_string(), "humidity".to_string()]));
        assert_eq!(config.buffer_capacity, 128);
        assert_eq!(config.max_dependency_depth, 5);
        assert!(config.temporal_mode.extended_last_known);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.store["kind"], "redis");
    }
}
