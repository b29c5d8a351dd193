//! Server configuration, loaded from a YAML file with sensible defaults
//! for every field so a bare `listen` works against an empty config.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

fn default_addr() -> String {
    "127.0.0.1:5433".to_string()
}

fn default_data_directory() -> PathBuf {
    PathBuf::from("tinydb.db")
}

fn default_page_size() -> u32 {
    4096
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_recv_size() -> u32 {
    1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_recv_size")]
    pub max_recv_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            data_directory: default_data_directory(),
            page_size: default_page_size(),
            log_level: default_log_level(),
            max_recv_size: default_max_recv_size(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl Config {
    /// Loads a config from `path`, if given, falling back to field-level
    /// defaults for anything the file omits. With no path at all, returns
    /// the all-defaults config.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Config::default());
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
