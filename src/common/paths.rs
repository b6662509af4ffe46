//! Configuration, log and test-source paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/stepdeck/`, `~/.local/share/stepdeck/logs/`
//! - macOS: `~/Library/Application Support/stepdeck/`
//! - Windows: `%APPDATA%\stepdeck\`

use std::path::{Path, PathBuf};

/// Application name used for config/data directories
const APP_NAME: &str = "stepdeck";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

/// Directory whose changes should reset the running test
///
/// The nearest ancestor named `test` or `spec`, falling back to the
/// directory containing the file.
pub fn test_directory(source: &Path) -> PathBuf {
    source
        .ancestors()
        .skip(1)
        .find(|dir| {
            matches!(
                dir.file_name().and_then(|name| name.to_str()),
                Some("test") | Some("spec")
            )
        })
        .or_else(|| source.parent())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Absolute form of a test source path, used for permalinks and matching
pub fn absolute_source_path(source: &Path) -> PathBuf {
    source
        .canonicalize()
        .unwrap_or_else(|_| match std::env::current_dir() {
            Ok(cwd) if source.is_relative() => cwd.join(source),
            _ => source.to_path_buf(),
        })
}
