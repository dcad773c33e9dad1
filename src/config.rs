//! Engine settings persisted as TOML under the `.featlens` root.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;
use crate::scoring::signature::DEFAULT_STD_MULTIPLIER;

pub const CONFIG_FILE_NAME: &str = "settings.toml";

/// Errors while loading or saving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No suitable config directory available")]
    NoConfigDir,
    #[error("Failed to prepare config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse settings file {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize settings: {0}")]
    SerializeToml(toml::ser::Error),
}

/// Persisted engine settings with sensible defaults.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the compute backend serving classification/histograms.
    pub backend_base_url: String,
    /// Spread multiplier for signature inference.
    pub std_multiplier: f32,
    /// Default select threshold before histogram statistics arrive.
    pub select_threshold: f32,
    /// Default reject threshold before histogram statistics arrive.
    pub reject_threshold: f32,
    /// Cap on candidate matches returned by the matcher.
    pub candidate_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_base_url: "http://127.0.0.1:8000".to_string(),
            std_multiplier: DEFAULT_STD_MULTIPLIER,
            select_threshold: 0.8,
            reject_threshold: -0.8,
            candidate_limit: crate::scoring::matcher::DEFAULT_MATCH_LIMIT,
        }
    }
}

/// Resolve the settings file path inside the app root.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = app_dirs::app_root_dir().map_err(map_app_dir_error)?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Load settings from disk, returning defaults if the file is missing.
pub fn load_or_default() -> Result<Settings, ConfigError> {
    let path = config_path()?;
    load_from(&path)
}

/// Save settings to the default location.
pub fn save(settings: &Settings) -> Result<(), ConfigError> {
    let path = config_path()?;
    save_to(settings, &path)
}

pub(crate) fn load_from(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn save_to(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = toml::to_string_pretty(settings).map_err(ConfigError::SerializeToml)?;
    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn map_app_dir_error(error: app_dirs::AppDirError) -> ConfigError {
    match error {
        app_dirs::AppDirError::NoBaseDir => ConfigError::NoConfigDir,
        app_dirs::AppDirError::CreateDir { path, source } => ConfigError::CreateDir { path, source },
    }
}
