//! Configuration loading and saving.
//!
//! The config lives as TOML in the platform config directory. A missing
//! file is not an error; every field falls back to a built-in default, and
//! load or save failures leave the session running on those defaults.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

pub const DEFAULT_MODEL: &str = "dolphin-phi";
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:11434";
pub const DEFAULT_IMAGE_SERVICE_URL: &str = "http://localhost:8188";
pub const DEFAULT_WORKFLOW_PATH: &str = "~/.config/sotto/workflow.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Model requested from the chat service.
    pub model: String,
    /// Base URL of the chat service.
    pub service_url: String,
    /// Base URL of the image service.
    pub image_service_url: String,
    /// Workflow template submitted to the image service.
    pub workflow_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            service_url: DEFAULT_SERVICE_URL.to_string(),
            image_service_url: DEFAULT_IMAGE_SERVICE_URL.to_string(),
            workflow_path: DEFAULT_WORKFLOW_PATH.to_string(),
        }
    }
}

/// Errors that can occur when loading configuration from disk.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config at {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, ConfigError> {
        Self::load_from_path(&Self::config_path())
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })?;
        Ok(config.normalized())
    }

    pub fn save(&self) -> Result<(), Box<dyn StdError>> {
        self.save_to_path(&Self::config_path())
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn StdError>> {
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };

        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(config_path)
            .map_err(|err| -> Box<dyn StdError> { Box::new(err) })?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        match ProjectDirs::from("org", "sotto", "sotto") {
            Some(dirs) => dirs.config_dir().join("config.toml"),
            None => PathBuf::from("sotto.toml"),
        }
    }

    /// Empty fields become defaults; bare host:port URLs gain a scheme.
    pub fn normalized(mut self) -> Self {
        if self.model.is_empty() {
            self.model = DEFAULT_MODEL.to_string();
        }
        self.service_url = normalize_service_url(&self.service_url, DEFAULT_SERVICE_URL);
        self.image_service_url =
            normalize_service_url(&self.image_service_url, DEFAULT_IMAGE_SERVICE_URL);
        if self.workflow_path.is_empty() {
            self.workflow_path = DEFAULT_WORKFLOW_PATH.to_string();
        }
        self
    }

    /// Workflow path with a leading `~/` expanded against `$HOME`.
    pub fn expanded_workflow_path(&self) -> PathBuf {
        expand_home(&self.workflow_path)
    }
}

fn normalize_service_url(url: &str, default: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return default.to_string();
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_every_field() {
        let config = Config::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.service_url, DEFAULT_SERVICE_URL);
        assert_eq!(config.image_service_url, DEFAULT_IMAGE_SERVICE_URL);
        assert_eq!(config.workflow_path, DEFAULT_WORKFLOW_PATH);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "model = \"mistral\"\n").unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.model, "mistral");
        assert_eq!(loaded.service_url, DEFAULT_SERVICE_URL);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "model = [broken\n").unwrap();

        match Config::load_from_path(&path) {
            Err(ConfigError::Parse { .. }) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn schemeless_urls_gain_http_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "service_url = \"localhost:11434\"\n").unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.service_url, "http://localhost:11434");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.model = "qwen3:1.7b".to_string();
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.model, "qwen3:1.7b");
    }
}
