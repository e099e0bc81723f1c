use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::APP_DIR_NAME,
    models::{TrackedApp, UsbDeviceIdentity},
};

const APPS_FILE: &str = "apps.json";
const SELECTED_DEVICE_FILE: &str = "selected_usb.json";

/// JSON persistence for the tracked-app registry and the selected USB device.
#[derive(Debug, Clone)]
pub struct AppStore {
    root: PathBuf,
}

impl AppStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under the per-user local data directory.
    pub fn default_location() -> Option<Self> {
        Some(Self::new(dirs::data_local_dir()?.join(APP_DIR_NAME)))
    }

    pub fn load_apps(&self) -> Vec<TrackedApp> {
        self.read_json(APPS_FILE).unwrap_or_default()
    }

    pub fn save_apps(&self, apps: &[TrackedApp]) -> Result<()> {
        self.write_json(APPS_FILE, &apps)
    }

    pub fn load_selected_device(&self) -> Option<UsbDeviceIdentity> {
        self.read_json::<Option<UsbDeviceIdentity>>(SELECTED_DEVICE_FILE)
            .flatten()
    }

    pub fn save_selected_device(&self, device: Option<&UsbDeviceIdentity>) -> Result<()> {
        self.write_json(SELECTED_DEVICE_FILE, &device)
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Option<T> {
        let path = self.root.join(file);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("failed to parse {:?}: {err}", path);
                None
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {:?}", self.root))?;
        let path = self.root.join(file);
        let payload = serde_json::to_string_pretty(value)?;
        fs::write(&path, payload).with_context(|| format!("failed to write {:?}", path))?;
        debug!("wrote {:?}", path);
        Ok(())
    }
}

/// Default display name for a newly added path: its file name.
pub fn display_name_for_path(path: &str) -> String {
    path.rsplit(['\\', '/'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(path)
        .to_string()
}

/// Appends new entries for `paths`, skipping blanks and paths already tracked.
/// Returns how many were added.
pub fn add_tracked_apps<I, S>(apps: &mut Vec<TrackedApp>, paths: I) -> usize
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut next_id = apps.iter().map(|app| app.id).max().map_or(1, |id| id + 1);
    let mut added = 0;
    for path in paths {
        let path = path.as_ref().trim().trim_matches('"');
        if path.is_empty() || apps.iter().any(|app| app.path == path) {
            continue;
        }
        apps.push(TrackedApp {
            id: next_id,
            name: display_name_for_path(path),
            path: path.to_string(),
        });
        next_id += 1;
        added += 1;
    }
    added
}

pub fn remove_tracked_app(apps: &mut Vec<TrackedApp>, path: &str) -> bool {
    let before = apps.len();
    apps.retain(|app| app.path != path);
    apps.len() != before
}

pub fn rename_tracked_app(apps: &mut [TrackedApp], path: &str, name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() {
        return false;
    }
    match apps.iter_mut().find(|app| app.path == path) {
        Some(app) => {
            app.name = name.to_string();
            true
        }
        None => false,
    }
}

pub fn sorted_for_display(apps: &[TrackedApp]) -> Vec<TrackedApp> {
    let mut sorted = apps.to_vec();
    sorted.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    sorted
}
