use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const APP_DIR_NAME: &str = "usb-autostart";
const SETTINGS_FILE: &str = "settings.json";

/// `%SystemRoot%`, when the environment provides it.
static SYSTEM_ROOT: Lazy<Option<String>> = Lazy::new(|| {
    std::env::var("SystemRoot")
        .or_else(|_| std::env::var("windir"))
        .ok()
        .map(|value| value.trim().trim_end_matches(['\\', '/']).to_string())
        .filter(|value| !value.is_empty())
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub poll_interval_ms: u64,
    pub query_timeout_ms: u64,
    pub usb_poll_interval_ms: u64,
    pub excluded_path_fragments: Vec<String>,
    pub executable_extensions: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            query_timeout_ms: 3000,
            usb_poll_interval_ms: 1000,
            excluded_path_fragments: default_excluded_fragments(),
            executable_extensions: default_executable_extensions(),
        }
    }
}

impl AppConfig {
    /// Loads settings from disk, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        let Ok(content) = fs::read_to_string(&path) else {
            debug!("no settings at {:?}, using defaults", path);
            return Self::default();
        };
        Self::from_json(&content).unwrap_or_else(|err| {
            warn!("failed to parse settings {:?}: {err}", path);
            Self::default()
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("invalid settings json")
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path().context("no config directory on this system")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {:?}", parent))?;
        }
        let payload = serde_json::to_string_pretty(self)?;
        fs::write(&path, payload).with_context(|| format!("failed to write {:?}", path))?;
        debug!("wrote settings {:?}", path);
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms.max(100))
    }

    pub fn usb_poll_interval(&self) -> Duration {
        Duration::from_millis(self.usb_poll_interval_ms.max(100))
    }
}

pub fn config_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join(APP_DIR_NAME).join(SETTINGS_FILE))
}

fn default_excluded_fragments() -> Vec<String> {
    if cfg!(windows) {
        let mut fragments = vec!["\\Windows\\".to_string(), "\\Microsoft.NET\\".to_string()];
        if let Some(root) = SYSTEM_ROOT.as_ref() {
            fragments.push(format!("{root}\\"));
        }
        fragments
    } else {
        ["/usr/libexec/", "/usr/lib/", "/usr/sbin/", "/sbin/", "/System/"]
            .iter()
            .map(|value| value.to_string())
            .collect()
    }
}

fn default_executable_extensions() -> Vec<String> {
    if cfg!(windows) {
        vec!["exe".to_string()]
    } else {
        Vec::new()
    }
}
