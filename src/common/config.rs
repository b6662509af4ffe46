//! Configuration file handling
//!
//! The whole configuration is also served read-only by the UI server
//! (`GET /api/config`), so every section is `Serialize`.

use serde::{Deserialize, Serialize};

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct Config {
    /// UI server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Test run settings
    #[serde(default)]
    pub run: RunConfig,

    /// Step trigger registry settings
    #[serde(default)]
    pub steps: StepsConfig,

    /// Browser event buffer settings
    #[serde(default)]
    pub events: EventsConfig,
}

/// UI server settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Port the control UI is served on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    3004
}

/// Test run settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RunConfig {
    /// Reset the running test when a file in the test directory changes
    #[serde(default = "default_true")]
    pub reload_test_files: bool,

    /// Keep the previous pause setting after a file-change reload
    #[serde(default = "default_true")]
    pub auto_run_on_reload: bool,

    /// Editor URL scheme for step permalinks (empty disables permalinks)
    #[serde(default = "default_editor_scheme")]
    pub editor_scheme: String,

    /// Record page history in the UI
    #[serde(default = "default_true")]
    pub history_recording: bool,

    /// Base URL relative `visit` targets are resolved against
    #[serde(default = "default_app_host")]
    pub app_host: String,

    /// Artificial delay after each page action (dry-run driver only)
    #[serde(default)]
    pub action_delay_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            reload_test_files: true,
            auto_run_on_reload: true,
            editor_scheme: default_editor_scheme(),
            history_recording: true,
            app_host: default_app_host(),
            action_delay_ms: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_editor_scheme() -> String {
    "vscode".to_string()
}

fn default_app_host() -> String {
    "http://localhost:3000".to_string()
}

/// Step trigger registry settings
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct StepsConfig {
    /// Extra method names that count as steps (e.g. project test helpers)
    #[serde(default)]
    pub extra: Vec<String>,

    /// Default method names that should not count as steps
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Browser event buffer settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EventsConfig {
    /// Maximum number of browser events kept per run
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
        }
    }
}

fn default_max_events() -> usize {
    1_000
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| super::Error::file_read(&path, &e))?;
                return Self::from_toml(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Origin the control UI is reachable at
    pub fn ui_origin(&self) -> String {
        format!("http://localhost:{}", self.server.port)
    }

    /// Editor scheme if permalinks are enabled
    pub fn editor_scheme(&self) -> Option<&str> {
        let scheme = self.run.editor_scheme.trim();
        (!scheme.is_empty()).then_some(scheme)
    }
}
