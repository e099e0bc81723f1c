use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    dialog,
    models::{AppLiveData, RunningProcessInfo, TrackedApp, UsbDeviceIdentity},
    process_table::ProcessFilter,
    state::{lock, AppSession},
    store,
    usb_matcher::{DeviceEvent, UsbLinkState, UsbTrigger},
};

pub async fn open_file_selection_dialog() -> Result<Vec<String>> {
    tokio::task::spawn_blocking(dialog::pick_executables)
        .await
        .context("file dialog task failed")?
}

pub async fn get_process_icon(session: &AppSession, path: &str) -> Option<String> {
    let icons = session.icons.clone();
    let path = PathBuf::from(path);
    match tokio::task::spawn_blocking(move || icons.icon_for(&path)).await {
        Ok(icon) => icon,
        Err(err) => {
            warn!("icon task failed: {err}");
            None
        }
    }
}

pub async fn is_app_running(session: &AppSession, path: &str) -> bool {
    session.engine.is_running(path).await
}

pub async fn get_app_list_details(session: &AppSession, paths: &[String]) -> Vec<AppLiveData> {
    session
        .engine
        .app_list_details(paths, session.icons.clone())
        .await
}

pub async fn launch_app(session: &AppSession, paths: &[String]) {
    session.engine.launch(paths).await;
}

pub async fn stop_app(session: &AppSession, paths: &[String]) {
    session.engine.stop(paths).await;
}

pub async fn list_running_processes(
    session: &AppSession,
    search: Option<&str>,
) -> Vec<RunningProcessInfo> {
    let filter = ProcessFilter::from_config(&session.config_snapshot());
    session
        .engine
        .list_all_tracked_processes(&filter, search)
        .await
}

pub fn is_auto_start_enabled(session: &AppSession) -> bool {
    session.autostart.is_enabled()
}

pub fn set_auto_start(session: &AppSession, enable: bool) -> Result<()> {
    session.autostart.set_enabled(enable)?;
    info!("autostart {}", if enable { "enabled" } else { "disabled" });
    Ok(())
}

pub async fn start_all(session: &AppSession) {
    let paths = session.tracked_paths();
    info!("starting {} tracked apps", paths.len());
    session.engine.launch(&paths).await;
}

pub async fn stop_all(session: &AppSession) {
    let paths = session.tracked_paths();
    info!("stopping {} tracked apps", paths.len());
    session.engine.stop(&paths).await;
}

/// Tracks `paths` and persists the registry. Returns how many were new.
pub fn add_apps<I, S>(session: &AppSession, paths: I) -> Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut apps = lock(&session.apps);
    let added = store::add_tracked_apps(&mut apps, paths);
    if added > 0 {
        session.store.save_apps(&apps)?;
    }
    Ok(added)
}

pub fn remove_app(session: &AppSession, path: &str) -> Result<bool> {
    let mut apps = lock(&session.apps);
    let removed = store::remove_tracked_app(&mut apps, path);
    if removed {
        session.store.save_apps(&apps)?;
    }
    Ok(removed)
}

pub fn rename_app(session: &AppSession, path: &str, name: &str) -> Result<bool> {
    let mut apps = lock(&session.apps);
    let renamed = store::rename_tracked_app(&mut apps, path, name);
    if renamed {
        session.store.save_apps(&apps)?;
    }
    Ok(renamed)
}

pub fn tracked_apps(session: &AppSession) -> Vec<TrackedApp> {
    store::sorted_for_display(&session.apps_snapshot())
}

/// Records the user's trigger device and persists it. Selecting never starts
/// or stops anything by itself.
pub fn select_usb_device(
    session: &AppSession,
    device: Option<UsbDeviceIdentity>,
) -> Result<UsbLinkState> {
    session.store.save_selected_device(device.as_ref())?;
    let mut matcher = lock(&session.usb);
    matcher.select(device);
    Ok(matcher.state())
}

/// Feeds one device event to the matcher and runs start-all or stop-all when
/// the selected device arrives or leaves.
pub async fn apply_device_event(session: &AppSession, event: DeviceEvent) -> Option<UsbTrigger> {
    let trigger = lock(&session.usb).handle(event);
    match trigger {
        Some(UsbTrigger::SelectedConnected) => {
            info!("selected usb device connected");
            start_all(session).await;
        }
        Some(UsbTrigger::SelectedDisconnected) => {
            info!("selected usb device disconnected");
            stop_all(session).await;
        }
        None => {}
    }
    trigger
}

/// Applies monitor events in arrival order until the channel closes.
pub fn spawn_usb_dispatcher(
    session: AppSession,
    mut events: mpsc::Receiver<DeviceEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            apply_device_event(&session, event).await;
        }
        debug!("usb event stream closed");
    })
}
