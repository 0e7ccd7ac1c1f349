//! Configuration management for the schema store
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (registry.toml)
//! - Environment variables (SCHEMA_REGISTRY__*)
//!
//! ## Example config file (registry.toml):
//! ```toml
//! [store]
//! root = "./schemas"
//! schema_extension = "avsc"
//! metadata_filename = "schema.meta.yaml"
//!
//! [compatibility]
//! default_mode = "BACKWARD"
//! transitive_scan = false
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::metadata::CompatibilityMode;
use crate::store::{DEFAULT_METADATA_FILENAME, DEFAULT_SCHEMA_EXTENSION};

/// Main configuration for the schema store
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    /// Store layout
    #[serde(default)]
    pub store: StoreConfig,

    /// Compatibility checking settings
    #[serde(default)]
    pub compatibility: CompatibilityConfig,
}

/// Where and how schemas are laid out on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory holding one directory per schema name
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Extension of schema version files (`v<N>.<ext>`)
    #[serde(default = "default_schema_extension")]
    pub schema_extension: String,

    /// Name of the metadata file inside each schema directory
    #[serde(default = "default_metadata_filename")]
    pub metadata_filename: String,
}

/// Compatibility settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompatibilityConfig {
    /// Mode given to metadata created for brand-new schema names
    #[serde(default)]
    pub default_mode: CompatibilityMode,

    /// Check `*_TRANSITIVE` modes against every stored version instead of
    /// only the latest one
    #[serde(default)]
    pub transitive_scan: bool,
}

// Default value functions
fn default_root() -> PathBuf {
    PathBuf::from("schemas")
}

fn default_schema_extension() -> String {
    DEFAULT_SCHEMA_EXTENSION.to_string()
}

fn default_metadata_filename() -> String {
    DEFAULT_METADATA_FILENAME.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            schema_extension: default_schema_extension(),
            metadata_filename: default_metadata_filename(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, with an optional explicit file layered on top
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["registry.toml", ".registry.toml", "config/registry.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) =
            directories::ProjectDirs::from("dev", "familiar", "schema-store")
        {
            let xdg_config = config_dir.config_dir().join("registry.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SCHEMA_REGISTRY__STORE__ROOT=/srv/schemas
        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_REGISTRY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Store root with relative paths resolved against the working directory
    pub fn root_path(&self) -> PathBuf {
        if self.store.root.is_absolute() {
            self.store.root.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.store.root)
        }
    }
}
