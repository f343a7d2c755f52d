//! Startup configuration for the snapshot engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Device categories managed by dedicated subsystems, never by the registry.
pub const ALWAYS_SHARED: [&str; 2] = ["ram", "block"];

/// Save entry of the CPU, snapshotted by the execution engine itself.
pub const CPU_DEVICE: &str = "cpu";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine configuration, read once at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Send block I/O straight to the shared backing medium.
    ///
    /// Unsafe while more than one state exists: states overwrite each
    /// other's disk contents.
    pub persistent_disk_writes: bool,
    /// Devices shared between all states (excluded from per-state snapshots).
    #[serde(deserialize_with = "de_device_list")]
    pub shared_devices: Vec<String>,
    /// Exclude the `cpu` save entry.
    pub share_cpu: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persistent_disk_writes: false,
            shared_devices: Vec::new(),
            share_cpu: true,
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file.  Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Replace the shared device list with a comma-separated string.
    pub fn with_shared_devices(mut self, list: &str) -> Self {
        self.shared_devices = parse_device_list(list);
        self
    }

    /// Full exclusion set: configured devices plus the implicit categories.
    pub fn exclusion_set(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = self.shared_devices.iter().cloned().collect();
        set.extend(ALWAYS_SHARED.iter().map(|s| s.to_string()));
        if self.share_cpu {
            set.insert(CPU_DEVICE.to_string());
        }
        set
    }
}

/// Split a comma-separated device list, trimming whitespace and dropping
/// empty items.
pub fn parse_device_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accept either `"a,b"` or `["a", "b"]`.
fn de_device_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DeviceList {
        Joined(String),
        Items(Vec<String>),
    }

    Ok(match DeviceList::deserialize(deserializer)? {
        DeviceList::Joined(s) => parse_device_list(&s),
        DeviceList::Items(items) => items
            .iter()
            .flat_map(|s| parse_device_list(s))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!(!config.persistent_disk_writes);
        assert!(config.shared_devices.is_empty());
        assert!(config.share_cpu);
    }

    #[test]
    fn parse_list_trims_and_skips_empty() {
        assert_eq!(
            parse_device_list(" serial , ,timer,"),
            vec!["serial".to_string(), "timer".to_string()]
        );
        assert!(parse_device_list("").is_empty());
    }

    #[test]
    fn exclusion_set_includes_implicit_categories() {
        let config = EngineConfig::default().with_shared_devices("x");
        let set = config.exclusion_set();
        assert!(set.contains("x"));
        assert!(set.contains("ram"));
        assert!(set.contains("block"));
        assert!(set.contains("cpu"));
        assert!(!set.contains("y"));
    }

    #[test]
    fn cpu_can_be_snapshotted_per_state() {
        let config = EngineConfig {
            share_cpu: false,
            ..EngineConfig::default()
        };
        assert!(!config.exclusion_set().contains("cpu"));
    }

    #[test]
    fn json_joined_list() {
        let config =
            EngineConfig::from_json(r#"{"persistent_disk_writes": true, "shared_devices": "a,b"}"#)
                .unwrap();
        assert!(config.persistent_disk_writes);
        assert_eq!(config.shared_devices, vec!["a", "b"]);
        assert!(config.share_cpu);
    }

    #[test]
    fn json_array_list() {
        let config = EngineConfig::from_json(r#"{"shared_devices": ["a", " b "]}"#).unwrap();
        assert_eq!(config.shared_devices, vec!["a", "b"]);
    }

    #[test]
    fn json_empty_object_is_default() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn json_garbage_is_error() {
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = EngineConfig::from_file("/nonexistent/devshadow.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
