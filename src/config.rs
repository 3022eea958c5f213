//! Configuration
//!
//! Loaded from TOML, then optionally overridden from environment variables.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | PERIODIC_STORE_KIND | memory | memory or redis |
//! | PERIODIC_STORE_URL | redis://127.0.0.1:6379/ | Redis URL |
//! | PERIODIC_LOG_LEVEL | info | Default tracing level (RUST_LOG wins) |
//! | PERIODIC_LOG_JSON | false | Emit JSON log lines |

use crate::bucket::Granularity;
use crate::definition::{CounterDefinition, CounterSpec, DefinitionOptions, SetDefinition};
use crate::error::ConfigError;
use crate::store::ConfiguredStore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            kind: StoreKind::Memory,
            url: "redis://127.0.0.1:6379/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// One `[[counters]]` or `[[sets]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionConfig {
    pub namespace: String,
    pub field: String,
    pub granularity: Granularity,
    #[serde(default)]
    pub expiration_secs: Option<u64>,
    #[serde(default)]
    pub global: bool,
}

impl DefinitionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() || self.field.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "namespace and field must be non-empty (namespace='{}', field='{}')",
                self.namespace, self.field
            )));
        }
        if self.expiration_secs == Some(0) {
            return Err(ConfigError::Invalid(format!(
                "expiration_secs must be positive for {}:{}",
                self.namespace, self.field
            )));
        }
        Ok(())
    }

    pub fn to_spec(&self) -> CounterSpec {
        CounterSpec {
            namespace: self.namespace.clone(),
            field: self.field.clone(),
            granularity: self.granularity,
            expiration: self.options().expiration,
            global: self.global,
        }
    }

    pub fn options(&self) -> DefinitionOptions {
        DefinitionOptions {
            expiration: self.expiration_secs.map(Duration::from_secs),
            global: self.global,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodicConfig {
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub counters: Vec<DefinitionConfig>,
    pub sets: Vec<DefinitionConfig>,
}

impl PeriodicConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: PeriodicConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for def in self.counters.iter().chain(&self.sets) {
            def.validate()?;
        }
        Ok(())
    }

    /// Apply PERIODIC_* environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(kind) = var("PERIODIC_STORE_KIND") {
            self.store.kind = match kind.trim().to_ascii_lowercase().as_str() {
                "memory" => StoreKind::Memory,
                "redis" => StoreKind::Redis,
                other => {
                    return Err(ConfigError::Invalid(format!("unknown store kind '{}'", other)))
                }
            };
        }
        if let Some(url) = var("PERIODIC_STORE_URL") {
            self.store.url = url;
        }
        if let Some(level) = var("PERIODIC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = var("PERIODIC_LOG_JSON") {
            self.logging.json = json == "true" || json == "1";
        }
        Ok(())
    }

    /// Open the backend described by `[store]`
    pub async fn open_store(&self) -> Result<ConfiguredStore, ConfigError> {
        ConfiguredStore::open(&self.store).await
    }

    pub fn counter_definitions(&self) -> Vec<CounterDefinition> {
        self.counters
            .iter()
            .map(|c| CounterDefinition::from_spec(c.to_spec()))
            .collect()
    }

    pub fn set_definitions(&self) -> Vec<SetDefinition> {
        self.sets
            .iter()
            .map(|s| SetDefinition::from_spec(s.to_spec()))
            .collect()
    }
}
