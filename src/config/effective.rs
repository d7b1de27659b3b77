//! Effective configuration with provenance
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. User config (~/.config/annotator/config.toml)
//! 3. Explicit config file (--config)
//! 4. CLI flags

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use annotator_model::validate_attribute_key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use crate::controller::{Backoff, ControllerConfig};
use crate::reconcile::ReconcilerConfig;

/// Schema identifier
pub const SCHEMA_ID: &str = "annotator/effective_config@1";

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    File,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of the raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Typed view of the merged configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub finalizer: String,
    pub release_on_missing_target: bool,
    pub log_filter: String,
    pub controller: ControllerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSettings {
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub backoff: BackoffSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffSettings {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Settings {
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            finalizer: self.finalizer.clone(),
            release_on_missing_target: self.release_on_missing_target,
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.controller.workers,
            poll_interval: Duration::from_millis(self.controller.poll_interval_ms),
            backoff: Backoff {
                base: Duration::from_millis(self.controller.backoff.base_ms),
                max: Duration::from_millis(self.controller.backoff.max_ms),
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_attribute_key(&self.finalizer).map_err(|e| {
            ConfigError::ValidationError(format!("finalizer: {}", e))
        })?;
        if self.controller.workers == 0 {
            return Err(ConfigError::ValidationError(
                "controller.workers must be at least 1".to_string(),
            ));
        }
        if self.controller.poll_interval_ms < 10 {
            return Err(ConfigError::ValidationError(
                "controller.poll_interval_ms must be at least 10".to_string(),
            ));
        }
        let backoff = &self.controller.backoff;
        if backoff.base_ms == 0 || backoff.max_ms < backoff.base_ms {
            return Err(ConfigError::ValidationError(format!(
                "controller.backoff must satisfy 0 < base_ms <= max_ms (got {} and {})",
                backoff.base_ms, backoff.max_ms
            )));
        }
        Ok(())
    }
}

/// Effective configuration with full provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_id: String,

    pub created_at: DateTime<Utc>,

    /// The merged configuration object
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,

    #[serde(skip)]
    settings: Option<Settings>,
}

impl EffectiveConfig {
    /// Default location of the user config file.
    pub fn user_config_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config/annotator/config.toml"))
    }

    /// Layer-4 overrides from command-line flags, if any were given.
    pub fn cli_overrides(log_filter: Option<&str>) -> Option<Value> {
        log_filter.map(|filter| serde_json::json!({ "log_filter": filter }))
    }

    /// Build effective config from layers.
    ///
    /// A missing user config is skipped; a missing explicit file is an error.
    pub fn build(
        user_config_path: Option<&Path>,
        config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = user_config_path.filter(|p| p.exists()) {
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::User,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(path) = config_path {
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let settings: Settings = serde_json::from_value(merged.clone())
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        settings.validate()?;

        Ok(Self {
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            sources,
            settings: Some(settings),
        })
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        Ok((Self::toml_to_json(toml_value), digest))
    }

    /// Convert TOML Value to JSON Value
    fn toml_to_json(toml: toml::Value) -> Value {
        match toml {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i.into()),
            toml::Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Self::toml_to_json).collect())
            }
            toml::Value::Table(table) => Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect(),
            ),
        }
    }

    /// Typed settings extracted during [`EffectiveConfig::build`].
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        match &self.settings {
            Some(settings) => Ok(settings.clone()),
            None => serde_json::from_value(self.config.clone())
                .map_err(|e| ConfigError::ValidationError(e.to_string())),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by path (dot-separated)
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
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
