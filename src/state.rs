use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    autostart::Autostart,
    config::AppConfig,
    icons::IconSource,
    models::TrackedApp,
    process_core::ProcessEngine,
    process_table::ProcessBackend,
    store::AppStore,
    usb_matcher::UsbMatcher,
};

/// Everything a front end needs, passed explicitly instead of living in
/// globals. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct AppSession {
    pub config: Arc<Mutex<AppConfig>>,
    pub apps: Arc<Mutex<Vec<TrackedApp>>>,
    pub usb: Arc<Mutex<UsbMatcher>>,
    pub engine: Arc<ProcessEngine>,
    pub icons: Arc<dyn IconSource>,
    pub autostart: Arc<dyn Autostart>,
    pub store: Arc<AppStore>,
}

impl AppSession {
    /// Builds a session and restores the registry and USB selection from `store`.
    pub fn new(
        config: AppConfig,
        store: AppStore,
        backend: Arc<dyn ProcessBackend>,
        icons: Arc<dyn IconSource>,
        autostart: Arc<dyn Autostart>,
    ) -> Self {
        let engine = ProcessEngine::new(backend, config.query_timeout());
        let apps = store.load_apps();
        let matcher = UsbMatcher::restore(store.load_selected_device());
        Self {
            config: Arc::new(Mutex::new(config)),
            apps: Arc::new(Mutex::new(apps)),
            usb: Arc::new(Mutex::new(matcher)),
            engine: Arc::new(engine),
            icons,
            autostart,
            store: Arc::new(store),
        }
    }

    pub fn config_snapshot(&self) -> AppConfig {
        lock(&self.config).clone()
    }

    pub fn apps_snapshot(&self) -> Vec<TrackedApp> {
        lock(&self.apps).clone()
    }

    pub fn tracked_paths(&self) -> Vec<String> {
        lock(&self.apps).iter().map(|app| app.path.clone()).collect()
    }

    pub fn matcher_snapshot(&self) -> UsbMatcher {
        lock(&self.usb).clone()
    }
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::test_support::MemoryAutostart;
    use super::*;
    use crate::{
        icons::SystemIcons, models::UsbDeviceIdentity, process_core::test_support::StubBackend,
        store::add_tracked_apps, usb_matcher::UsbLinkState,
    };

    #[test]
    fn session_restores_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = AppStore::new(dir.path());
        let mut apps = Vec::new();
        add_tracked_apps(&mut apps, ["C:\\A\\foo.exe"]);
        store.save_apps(&apps).unwrap();
        let device = UsbDeviceIdentity::from_descriptor(1, 2, None, None, None);
        store.save_selected_device(Some(&device)).unwrap();

        let session = AppSession::new(
            AppConfig::default(),
            AppStore::new(dir.path()),
            Arc::new(StubBackend::default()),
            Arc::new(SystemIcons),
            Arc::new(MemoryAutostart::default()),
        );

        assert_eq!(session.tracked_paths(), vec!["C:\\A\\foo.exe".to_string()]);
        let matcher = session.matcher_snapshot();
        assert_eq!(matcher.selected(), Some(&device));
        assert_eq!(matcher.state(), UsbLinkState::SelectedDisconnected);
    }
}
