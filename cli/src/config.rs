//! Configuration handling for the pash CLI
//!
//! Supports loading configuration from pash.toml files with CLI argument overrides.

use anyhow::{Context, Result};
use pash_core::bisulfite::DEFAULT_MAX_VARIANTS;
use pash_core::params::{DEFAULT_KEEP_PERCENT, DEFAULT_WORD_OFFSET};
use pash_core::Sensitivity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "pash.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub map: MapConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default number of threads to use
    #[serde(default = "default_threads")]
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Spaced seed preset (`12from18`) or literal 0/1 pattern
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Seeding density
    #[serde(default)]
    pub sensitivity: Sensitivity,

    /// Seed step used with the `user` sensitivity
    #[serde(default = "default_word_offset")]
    pub word_offset: usize,

    /// Percentage below the best score still reported
    #[serde(default = "default_top_percent")]
    pub top_percent: f64,

    /// Maximum mappings reported per read
    #[serde(default = "default_max_mappings")]
    pub max_mappings: u32,

    /// Percentage of seed occurrences kept in the index
    #[serde(default = "default_keep_percent")]
    pub keep_percent: u32,

    /// Map bisulfite-treated reads
    #[serde(default)]
    pub bisulfite: bool,

    /// Cap on C/T variants generated per bisulfite seed
    #[serde(default = "default_max_bisulfite_variants")]
    pub max_bisulfite_variants: usize,

    /// Gzip-compress the output
    #[serde(default)]
    pub gzip: bool,

    /// Seed ignore list applied to every run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_list: Option<PathBuf>,
}

fn default_threads() -> usize { num_cpus::get() }
fn default_pattern() -> String { pash_core::mask::DEFAULT_MASK_NAME.to_string() }
fn default_word_offset() -> usize { DEFAULT_WORD_OFFSET }
fn default_top_percent() -> f64 { 1.0 }
fn default_max_mappings() -> u32 { 1 }
fn default_keep_percent() -> u32 { DEFAULT_KEEP_PERCENT }
fn default_max_bisulfite_variants() -> usize { DEFAULT_MAX_VARIANTS }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            sensitivity: Sensitivity::default(),
            word_offset: default_word_offset(),
            top_percent: default_top_percent(),
            max_mappings: default_max_mappings(),
            keep_percent: default_keep_percent(),
            bisulfite: false,
            max_bisulfite_variants: default_max_bisulfite_variants(),
            gzip: false,
            ignore_list: None,
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    log::info!("Loading configuration from: {}", DEFAULT_CONFIG_FILE);
                    Self::load_from_file(&default_path)?
                } else {
                    log::debug!("Using default configuration");
                    Self::default()
                }
            }
        };

        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = Self::to_toml(self)?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Generate example configuration file content
    pub fn example_toml() -> Result<String> {
        Self::to_toml(&Self::default())
    }

    fn to_toml(config: &Config) -> Result<String> {
        toml::to_string_pretty(config).context("Failed to serialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.map.pattern, "12from18");
        assert_eq!(config.map.sensitivity, Sensitivity::Medium);
        assert_eq!(config.map.keep_percent, 99);
        assert!(config.general.threads >= 1);
    }

    #[test]
    fn test_config_roundtrip() -> Result<()> {
        let mut config = Config::default();
        config.map.sensitivity = Sensitivity::Fast;
        config.map.max_mappings = 5;
        let temp_file = NamedTempFile::new()?;

        config.save_to_file(temp_file.path())?;
        let loaded = Config::load_from_file(temp_file.path())?;

        assert_eq!(loaded.map.sensitivity, Sensitivity::Fast);
        assert_eq!(loaded.map.max_mappings, 5);
        assert_eq!(loaded.map.pattern, config.map.pattern);

        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "[map]\nsensitivity = \"low\"\ntop_percent = 5.0")?;

        let config = Config::load(Some(temp_file.path()))?;
        assert_eq!(config.map.sensitivity, Sensitivity::Low);
        assert_eq!(config.map.top_percent, 5.0);
        assert_eq!(config.map.max_mappings, 1);
        assert_eq!(config.map.word_offset, 6);

        Ok(())
    }

    #[test]
    fn test_bad_sensitivity_is_rejected() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "[map]\nsensitivity = \"extreme\"")?;
        assert!(Config::load_from_file(temp_file.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_example_toml_generation() -> Result<()> {
        let example = Config::example_toml()?;
        assert!(example.contains("[general]"));
        assert!(example.contains("[map]"));
        assert!(example.contains("sensitivity = \"medium\""));
        Ok(())
    }
}
