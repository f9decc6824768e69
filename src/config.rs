//! Configuration management for the kernel registry
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (kernel.toml)
//! - Environment variables (KERNEL__*)
//!
//! ## Example config file (kernel.toml):
//! ```toml
//! [registry]
//! path = "./kernel-data"
//! max_chain_depth = 64
//! hash_scheme = "concatenated"
//!
//! [output]
//! format = "pretty"
//!
//! [logging]
//! filter = "info"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::checksum::HashScheme;
use crate::instance::DEFAULT_MAX_CHAIN_DEPTH;

/// Main configuration for the kernel registry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KernelConfig {
    /// Registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Record output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory holding persisted instances
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,

    /// Longest ancestor chain a new instance may have
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    /// Encoding used for the identity hash index
    #[serde(default)]
    pub hash_scheme: HashScheme,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when RUST_LOG is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

// Default value functions
fn default_registry_path() -> PathBuf {
    PathBuf::from("kernel-data")
}

fn default_max_chain_depth() -> usize {
    DEFAULT_MAX_CHAIN_DEPTH
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            max_chain_depth: default_max_chain_depth(),
            hash_scheme: HashScheme::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl KernelConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["kernel.toml", ".kernel.toml", "config/kernel.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "kernel", "kernel-registry")
        {
            let xdg_config = config_dir.config_dir().join("kernel.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // KERNEL__REGISTRY__MAX_CHAIN_DEPTH=8 and friends
        builder = builder.add_source(
            Environment::with_prefix("KERNEL")
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

    /// Get the registry path (resolves relative paths)
    pub fn registry_path(&self) -> PathBuf {
        if self.registry.path.is_absolute() {
            self.registry.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.registry.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert_eq!(config.registry.max_chain_depth, DEFAULT_MAX_CHAIN_DEPTH);
        assert_eq!(config.registry.hash_scheme, HashScheme::Concatenated);
        assert_eq!(config.output.format, OutputFormat::Pretty);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_serialize_config() {
        let config = KernelConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[registry]"));
        assert!(toml_str.contains("hash_scheme = \"concatenated\""));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[registry]\nmax_chain_depth = 3\nhash_scheme = \"length-prefixed\"\n\n[output]\nformat = \"compact\"\n",
        )
        .unwrap();

        let config = KernelConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.registry.max_chain_depth, 3);
        assert_eq!(config.registry.hash_scheme, HashScheme::LengthPrefixed);
        assert_eq!(config.output.format, OutputFormat::Compact);
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let config = KernelConfig::load().unwrap();
        assert_eq!(config.registry.path, PathBuf::from("kernel-data"));
        assert_eq!(config.output.format, OutputFormat::Pretty);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.toml");
        let mut config = KernelConfig::default();
        config.registry.max_chain_depth = 7;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = KernelConfig::load_from(path.to_str()).unwrap();
        assert_eq!(loaded.registry.max_chain_depth, 7);
    }
}
