//! Persistent settings for the panel session host.
//!
//! Stored as JSON in `{config_dir}/panelink/settings.json`. Every field has a
//! default so partial or older files still load.

use anyhow::{Context, Result};
use panelink_core::client::PanelConnectionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const PANEL_URL_ENV: &str = "PANELINK_PANEL_URL";
pub const API_KEY_ENV: &str = "PANELINK_API_KEY";

#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the panel
    #[serde(default = "default_panel_url")]
    pub panel_url: String,

    /// Client API key sent as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Timeout for each panel API request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for the daemon websocket handshake
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Capacity of the session event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            panel_url: default_panel_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("panel_url", &self.panel_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

fn default_panel_url() -> String {
    "http://127.0.0.1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_event_buffer() -> usize {
    256
}

impl Settings {
    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(PANEL_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.panel_url = url;
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(key);
        }
    }

    pub fn panel_config(&self) -> PanelConnectionConfig {
        let mut config = PanelConnectionConfig::new(self.panel_url.clone());
        config.api_key = self.api_key.clone();
        config.request_timeout_secs = self.request_timeout_secs;
        config.connect_timeout_secs = self.connect_timeout_secs;
        config
    }
}

/// Get the config directory path
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("panelink")
}

/// Get the settings file path
pub fn get_settings_path() -> PathBuf {
    get_config_dir().join("settings.json")
}

/// Load settings, falling back to defaults on any problem. A missing file
/// is created with the defaults so there is something to edit.
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        log::info!("Settings file not found at {}, using defaults", path.display());
        let settings = Settings::default();
        if let Err(e) = save_settings(path, &settings) {
            log::warn!("Failed to write default settings: {:#}", e);
        }
        return settings;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::error!("Failed to read settings file {}: {}", path.display(), e);
            return Settings::default();
        }
    };

    match serde_json::from_str::<Settings>(&content) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to parse settings file {}: {}", path.display(), e);
            log::error!("Using default settings. Your settings file has been left untouched.");
            Settings::default()
        }
    }
}

/// Save settings to disk. The file may hold an API key, so it is
/// readable by the owner only on unix.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
            log::warn!(
                "Failed to restrict permissions on {}: {}",
                path.display(),
                e
            );
        }
    }
    Ok(())
}
