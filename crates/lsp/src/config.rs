//! Server configuration.
//!
//! Layers, later wins: built-in defaults, `blockyard.toml` in the editor's
//! workspace root, then the client's `initializationOptions`.

use std::path::{Path, PathBuf};

use blockyard_core::Vocabulary;
use serde::{Deserialize, Serialize};

/// File name of the optional on-disk configuration.
pub const CONFIG_FILE: &str = "blockyard.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration value: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ServerConfig {
    pub oracle: OracleConfig,
    /// File whose presence marks the root of a configuration project.
    pub root_marker: String,
    /// Quiet period after an edit before the oracle is invoked.
    pub debounce_ms: u64,
    pub vocabulary: Vocabulary,
}

/// How to invoke the external validation tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct OracleConfig {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
    /// Flag that narrows evaluation to one block, e.g. `--block`.
    pub entity_flag: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            root_marker: "workspace.yaml".to_string(),
            debounce_ms: 300,
            vocabulary: Vocabulary::default(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "blocks".to_string(),
            args: vec!["inspect".to_string(), "--format".to_string(), "json".to_string()],
            entity_flag: Some("--block".to_string()),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load `blockyard.toml` from `dir`, or defaults when there is none.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::load_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay a JSON object (the client's `initializationOptions`).
    ///
    /// Objects merge key by key; any other value replaces what is there.
    pub fn overlay_json(&self, overlay: serde_json::Value) -> Result<Self, ConfigError> {
        let mut base = serde_json::to_value(self)?;
        merge(&mut base, overlay);
        Ok(serde_json::from_value(base)?)
    }
}

fn merge(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, serde_json::Value::Null) => {}
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn toml_overrides_selected_keys() {
        let config = ServerConfig::from_toml_str(
            r#"
debounce_ms = 50

[oracle]
command = "/opt/bin/blocks"

[vocabulary]
block_kinds = ["nomad"]
"#,
        )
        .unwrap();
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.oracle.command, "/opt/bin/blocks");
        assert_eq!(config.oracle.args, OracleConfig::default().args);
        assert!(config.vocabulary.is_block_kind("nomad"));
        assert_eq!(config.root_marker, "workspace.yaml");
    }

    #[test]
    fn json_overlay_merges_nested_tables() {
        let config = ServerConfig::default()
            .overlay_json(json!({ "oracle": { "enabled": false }, "debounce_ms": 10 }))
            .unwrap();
        assert!(!config.oracle.enabled);
        assert_eq!(config.oracle.command, "blocks");
        assert_eq!(config.debounce_ms, 10);
    }

    #[test]
    fn null_overlay_is_ignored() {
        let config = ServerConfig::default()
            .overlay_json(serde_json::Value::Null)
            .unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(matches!(
            ServerConfig::from_toml_str("debounce_ms = \"soon\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
