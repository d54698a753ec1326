use crate::error::StoreError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Hard cap on entity id length, matching the `entities.id` column contract.
pub const MAX_ID_LENGTH: usize = 26;

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".canopy";

/// Store-wide settings consumed by the lifecycle and content layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Language used when content writes or content ordering omit one.
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Length of generated ids; provided ids are truncated to it.
    #[serde(default = "default_short_id_length")]
    pub short_id_length: usize,
    /// How many generated ids may collide before creation fails.
    #[serde(default = "default_short_id_max_attempts")]
    pub short_id_max_attempts: u32,
    /// Model discriminator assigned when a new entity does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            short_id_length: default_short_id_length(),
            short_id_max_attempts: default_short_id_max_attempts(),
            default_model: default_model(),
        }
    }
}

impl StoreConfig {
    /// Effective id length, clamped to `1..=MAX_ID_LENGTH`.
    #[must_use]
    pub fn id_length(&self) -> usize {
        self.short_id_length.clamp(1, MAX_ID_LENGTH)
    }
}

fn default_language() -> String {
    "en".to_string()
}

const fn default_short_id_length() -> usize {
    10
}

const fn default_short_id_max_attempts() -> u32 {
    5
}

fn default_model() -> String {
    "Entity".to_string()
}

/// Path of the project config file under `project_root`.
#[must_use]
pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR).join("config.toml")
}

/// Path of the SQLite store under `project_root`.
#[must_use]
pub fn store_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR).join("canopy.db")
}

/// Load `.canopy/config.toml`, falling back to defaults when it is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(project_root: &Path) -> Result<StoreConfig> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(StoreConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<StoreConfig>(&content).map_err(|err| {
        StoreError::ConfigParse {
            path,
            reason: err.message().to_string(),
        }
        .into()
    })
}

/// Load the project config and apply the `CANOPY_LANG` override.
///
/// # Errors
///
/// Returns an error if the config file exists but is invalid.
pub fn resolve_config(project_root: &Path) -> Result<StoreConfig> {
    let config = load_config(project_root)?;
    Ok(apply_language_override(config, env::var("CANOPY_LANG").ok()))
}

fn apply_language_override(mut config: StoreConfig, env_lang: Option<String>) -> StoreConfig {
    if let Some(lang) = env_lang {
        let lang = lang.trim();
        if !lang.is_empty() {
            config.default_language = lang.to_string();
        }
    }
    config
}

/// Render a config as TOML for `cnp init`.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_toml(config: &StoreConfig) -> Result<String> {
    toml::to_string_pretty(config).context("serialize store config")
}
