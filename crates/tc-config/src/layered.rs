use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Identifies which layer introduced a configuration change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigLayer {
    /// TOML file describing the experiment defaults.
    Base,
    /// JSON file carrying per-run overrides.
    Run,
}

/// Single leaf value that a layer added, replaced or removed.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigChange {
    pub layer: ConfigLayer,
    pub path: String,
    pub previous: Option<Value>,
    pub current: Option<Value>,
}

/// Collection of configuration layers that are merged in order.
#[derive(Clone, Debug, Default)]
pub struct ConfigLayering {
    pub base: Option<PathBuf>,
    pub run: Option<PathBuf>,
}

impl ConfigLayering {
    /// Overrides the base layer path.
    pub fn with_base<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base = Some(path.into());
        self
    }

    /// Overrides the run layer path.
    pub fn with_run<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.run = Some(path.into());
        self
    }
}

/// Result of merging layered configuration files.
#[derive(Clone, Debug)]
pub struct LayeredConfig {
    layering: ConfigLayering,
    value: Value,
    changes: Vec<ConfigChange>,
}

impl LayeredConfig {
    /// Loads the configured layers, merging base → run. Layers whose file is
    /// missing are skipped.
    pub fn load(layering: ConfigLayering) -> Result<Self, LayeredConfigError> {
        let mut value = Value::Object(Default::default());
        let mut changes = Vec::new();

        if let Some(base_path) = layering.base.as_ref() {
            if let Some(layer) = load_toml(base_path)? {
                apply_layer(&mut value, &layer, ConfigLayer::Base, &mut changes);
            }
        }
        if let Some(run_path) = layering.run.as_ref() {
            if let Some(layer) = load_json(run_path)? {
                apply_layer(&mut value, &layer, ConfigLayer::Run, &mut changes);
            }
        }

        for change in &changes {
            debug!(
                layer = ?change.layer,
                path = %change.path,
                previous = ?change.previous,
                current = ?change.current,
                "config layer applied"
            );
        }

        Ok(LayeredConfig {
            layering,
            value,
            changes,
        })
    }

    /// Returns the merged configuration as a `serde_json::Value`.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the layering metadata used for this configuration.
    pub fn layering(&self) -> &ConfigLayering {
        &self.layering
    }

    /// Returns every leaf change emitted while applying the layers.
    pub fn changes(&self) -> &[ConfigChange] {
        &self.changes
    }

    /// Deserialises the whole merged document.
    pub fn deserialize<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(self.value.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LayeredConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse JSON {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn load_toml(path: &Path) -> Result<Option<Value>, LayeredConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|source| LayeredConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: toml::Value = toml::from_str(&text).map_err(|source| LayeredConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_value(value)
        .map(Some)
        .map_err(|source| LayeredConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn load_json(path: &Path) -> Result<Option<Value>, LayeredConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|source| LayeredConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| LayeredConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn apply_layer(dest: &mut Value, layer: &Value, kind: ConfigLayer, out: &mut Vec<ConfigChange>) {
    let before = dest.clone();
    merge(dest, layer);
    diff(&before, dest, &mut Vec::new(), kind, out);
}

fn merge(dest: &mut Value, src: &Value) {
    match (dest, src) {
        (Value::Object(dest_map), Value::Object(src_map)) => {
            for (key, value) in src_map {
                match dest_map.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        dest_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (dest_slot, src_value) => {
            *dest_slot = src_value.clone();
        }
    }
}

fn diff(
    before: &Value,
    after: &Value,
    path: &mut Vec<String>,
    layer: ConfigLayer,
    out: &mut Vec<ConfigChange>,
) {
    if before == after {
        return;
    }

    let empty = serde_json::Map::new();
    let tables = match (before, after) {
        (Value::Object(before_map), Value::Object(after_map)) => Some((before_map, after_map)),
        (Value::Null, Value::Object(after_map)) => Some((&empty, after_map)),
        (Value::Object(before_map), Value::Null) => Some((before_map, &empty)),
        _ => None,
    };

    match tables {
        Some((before_map, after_map)) => {
            let mut keys: Vec<&String> = before_map.keys().chain(after_map.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                path.push(key.clone());
                let before_child = before_map.get(key).unwrap_or(&Value::Null);
                let after_child = after_map.get(key).unwrap_or(&Value::Null);
                diff(before_child, after_child, path, layer, out);
                path.pop();
            }
        }
        None => {
            let previous = (!before.is_null()).then(|| before.clone());
            let current = (!after.is_null()).then(|| after.clone());
            out.push(ConfigChange {
                layer,
                path: path.join("."),
                previous,
                current,
            });
        }
    }
}
