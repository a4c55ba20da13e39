use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::base_path::resolve_base_path;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub tui: TuiConfig,
    pub data: DataConfig,
}

/// Where the document/chat service lives and how its URLs are prefixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Service origin, e.g. `http://localhost:8000`.
    pub url: String,
    /// Explicit base path (or full URL whose path is used). Wins over
    /// proxy-path detection.
    pub base_path: Option<String>,
    /// Location path to run proxy-prefix detection against when no
    /// explicit base path is set (e.g. copied from a Workbench URL).
    pub location_path: Option<String>,
}

/// TUI-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuiConfig {
    /// Tick interval in milliseconds for the event loop.
    pub tick_rate_ms: u64,
    /// Enable mouse support in the terminal.
    pub mouse_enabled: bool,
}

/// Data directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Override the default data directory.
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            tui: TuiConfig::default(),
            data: DataConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            base_path: None,
            location_path: None,
        }
    }
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self {
            tick_rate_ms: 50,
            mouse_enabled: false,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { data_dir: None }
    }
}

impl AppConfig {
    /// Load configuration from `~/.config/tlfchat/config.toml`.
    /// Returns `Default` if the file is missing or unparseable.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    log::warn!(
                        "Failed to parse config at {}: {e} — using defaults",
                        config_path.display()
                    );
                    Self::default()
                }
            },
            Err(_) => {
                log::debug!(
                    "No config file at {} — using defaults",
                    config_path.display()
                );
                Self::default()
            }
        }
    }

    /// Resolve the URL path prefix once; threaded into the API client at
    /// startup rather than read from ambient state.
    pub fn resolved_base_path(&self) -> String {
        resolve_base_path(
            self.server.base_path.as_deref(),
            self.server.location_path.as_deref().unwrap_or("/"),
        )
    }

    /// Resolved data directory (override or XDG default).
    pub fn data_dir(&self) -> PathBuf {
        self.data.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join("tlfchat"))
                .unwrap_or_else(|| PathBuf::from("data"))
        })
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("tlfchat").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}
