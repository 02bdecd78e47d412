//! Configuration paths

use std::path::PathBuf;

/// Name used for the project directories
const APP_NAME: &str = "marionette-harness";

/// Get the configuration file path
///
/// - Linux: `~/.config/marionette-harness/config.toml`
/// - macOS: `~/Library/Application Support/marionette-harness/config.toml`
/// - Windows: `%APPDATA%\marionette-harness\config\config.toml`
pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
