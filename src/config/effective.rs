//! Effective configuration with provenance
//!
//! The effective config is the merged JSON object plus the list of layers
//! that contributed to it. [`EffectiveConfig::settings`] gives the typed,
//! validated view.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use super::defaults::builtin_value;
use super::merge::merge_layers;
use super::settings::Settings;

/// Environment variable naming the user config file.
pub const CONFIG_ENV_VAR: &str = "POLICY_RECO_CONFIG";

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    Cli,
}

/// A contributing layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Merged configuration and its sources, in precedence order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub config: Value,
    pub sources: Vec<ConfigSource>,
}

/// `~/.config/policy-reco/config.toml`, if a home directory is known.
pub fn default_user_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("policy-reco")
            .join("config.toml")
    })
}

impl EffectiveConfig {
    /// Pick the user config file.
    ///
    /// An explicit path or `$POLICY_RECO_CONFIG` must exist; the default
    /// location is used only when present.
    pub fn resolve_user_config(explicit: Option<PathBuf>) -> Result<Option<PathBuf>, ConfigError> {
        let named = explicit.or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
        if let Some(path) = named {
            if !path.exists() {
                return Err(ConfigError::NotFound(path));
            }
            return Ok(Some(path));
        }
        Ok(default_user_config_path().filter(|p| p.exists()))
    }

    /// Build the effective config from builtin defaults, an optional user
    /// file and CLI overrides.
    pub fn build(user_config: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![builtin_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
        }];

        if let Some(path) = user_config {
            layers.push(Self::load_toml_file(path)?);
            sources.push(ConfigSource {
                origin: ConfigOrigin::User,
                path: Some(path.to_string_lossy().to_string()),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
            });
        }

        let merged = merge_layers(layers);
        tracing::debug!(layers = sources.len(), "merged configuration");

        Ok(Self {
            config: merged,
            sources,
        })
    }

    fn load_toml_file(path: &Path) -> Result<Value, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        toml::from_str::<Value>(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Typed, validated settings.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let settings: Settings = serde_json::from_value(self.config.clone())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Get a config value by dot-separated path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None).unwrap();
        let settings = config.settings().unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_build_with_cli_override() {
        let cli = serde_json::json!({
            "namespace": "analytics",
            "kubeconfig": null,
            "poll": { "interval_seconds": 2 }
        });
        let config = EffectiveConfig::build(None, Some(cli)).unwrap();
        let settings = config.settings().unwrap();

        assert_eq!(settings.namespace, "analytics");
        assert_eq!(settings.kubeconfig, None);
        assert_eq!(settings.poll.interval_seconds, 2);
        assert_eq!(settings.poll.timeout_seconds, 3600);
        assert_eq!(config.sources.last().unwrap().origin, ConfigOrigin::Cli);
    }

    #[test]
    fn test_load_toml_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "namespace = \"theia\"").unwrap();
        writeln!(temp, "[store]").unwrap();
        writeln!(temp, "table = \"reco_results\"").unwrap();
        writeln!(temp, "http_port = 18123").unwrap();

        let config = EffectiveConfig::build(Some(temp.path()), None).unwrap();
        let settings = config.settings().unwrap();

        assert_eq!(settings.namespace, "theia");
        assert_eq!(settings.store.table, "reco_results");
        assert_eq!(settings.store.http_port, 18123);
        assert_eq!(settings.store.service, "clickhouse-clickhouse");
        assert_eq!(config.get("store.table").and_then(|v| v.as_str()), Some("reco_results"));
        assert_eq!(config.sources[1].origin, ConfigOrigin::User);
    }

    #[test]
    fn test_cli_beats_user_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "namespace = \"from-file\"").unwrap();

        let cli = serde_json::json!({ "namespace": "from-cli" });
        let config = EffectiveConfig::build(Some(temp.path()), Some(cli)).unwrap();
        assert_eq!(config.settings().unwrap().namespace, "from-cli");
    }

    #[test]
    fn test_malformed_toml() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "namespace = ").unwrap();
        let err = EffectiveConfig::build(Some(temp.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let cli = serde_json::json!({ "store": { "hostname": "x" } });
        let config = EffectiveConfig::build(None, Some(cli)).unwrap();
        assert!(matches!(config.settings(), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validation_runs_on_merged_result() {
        let cli = serde_json::json!({ "poll": { "interval_seconds": 0 } });
        let config = EffectiveConfig::build(None, Some(cli)).unwrap();
        let err = config.settings().unwrap_err();
        assert!(err.to_string().contains("interval_seconds"));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = EffectiveConfig::resolve_user_config(Some(missing.clone())).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(p) if p == missing));
    }

    #[test]
    fn test_explicit_existing_file_is_used() {
        let temp = NamedTempFile::new().unwrap();
        let resolved = EffectiveConfig::resolve_user_config(Some(temp.path().to_path_buf())).unwrap();
        assert_eq!(resolved.as_deref(), Some(temp.path()));
    }
}
