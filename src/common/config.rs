//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::Result;
use crate::harness::Expectation;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Where to find (or how to launch) the Marionette server
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Run defaults
    #[serde(default)]
    pub run: RunConfig,
}

/// Connection settings
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long to keep retrying the initial connection
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Browser binary to launch before connecting
    pub binary: Option<PathBuf>,

    /// Extra arguments for the browser binary
    #[serde(default)]
    pub binary_args: Vec<String>,

    /// Server that relative test page URLs resolve against
    pub base_url: Option<String>,
}

impl ConnectionConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            startup_timeout_secs: default_startup_timeout(),
            binary: None,
            binary_args: Vec::new(),
            base_url: None,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    2828
}
fn default_startup_timeout() -> u64 {
    60
}

/// Timeout settings
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Uniform search/script/page timeout in milliseconds
    pub default_ms: Option<u64>,

    /// Page load timeout applied when no uniform timeout is set
    #[serde(default = "default_page_timeout")]
    pub page_ms: u64,

    /// Default deadline for wait_for_condition
    #[serde(default = "default_wait_timeout")]
    pub wait_secs: f64,

    /// Polling interval for wait_for_condition
    #[serde(default = "default_wait_interval")]
    pub wait_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default_ms: None,
            page_ms: default_page_timeout(),
            wait_secs: default_wait_timeout(),
            wait_interval_ms: default_wait_interval(),
        }
    }
}

fn default_page_timeout() -> u64 {
    30_000
}
fn default_wait_timeout() -> f64 {
    30.0
}
fn default_wait_interval() -> u64 {
    500
}

/// Defaults applied to every invocation of a run
#[derive(Debug, Deserialize, Default)]
pub struct RunConfig {
    #[serde(default)]
    pub expected: Expectation,

    /// Switch into the test container before each test
    #[serde(default)]
    pub test_container: bool,

    /// JSON file with variables exposed to tests
    pub testvars: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| super::Error::file_read(path, &e))?;
        toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Read the testvars file, if one is configured
    pub fn load_testvars(&self) -> Result<serde_json::Value> {
        let Some(path) = &self.run.testvars else {
            return Ok(serde_json::Value::Null);
        };
        let content =
            std::fs::read_to_string(path).map_err(|e| super::Error::file_read(path, &e))?;
        serde_json::from_str(&content).map_err(|e| {
            super::Error::Config(format!("Invalid testvars file '{}': {}", path.display(), e))
        })
    }
}
