//! CLI configuration

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Get default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cardinal")
}

/// Default config file location
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cardinal")
        .join("config.toml")
}

/// Configuration for the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,
    pub bind: String,
    pub max_conflict_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            schema: None,
            bind: "127.0.0.1:7474".to_string(),
            max_conflict_retries: cardinal_engine::config::DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn keys() -> &'static [&'static str] {
        &["data_dir", "schema", "bind", "max_conflict_retries"]
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "data_dir" => Some(self.data_dir.display().to_string()),
            "schema" => Some(
                self.schema
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string()),
            ),
            "bind" => Some(self.bind.clone()),
            "max_conflict_retries" => Some(self.max_conflict_retries.to_string()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "schema" => self.schema = Some(PathBuf::from(value)),
            "bind" => self.bind = value.to_string(),
            "max_conflict_retries" => {
                self.max_conflict_retries = value
                    .parse()
                    .with_context(|| format!("max_conflict_retries must be a number, got '{}'", value))?;
            }
            _ => anyhow::bail!(
                "Unknown config key: {}. Available keys: {}",
                key,
                Self::keys().join(", ")
            ),
        }
        Ok(())
    }
}
