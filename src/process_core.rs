use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::{debug, info, warn};

use crate::{
    icons::IconSource,
    models::{AppLiveData, ProcessIdentity, RunningProcessInfo},
    process_table::{filter_tracked_processes, ProcessBackend, ProcessFilter, ProcessRecord},
};

const UNKNOWN_IDENTITY: &str = "unknown";

/// Derives the matching key for an executable path: the file name after the
/// last separator, without its trailing extension, lowercased.
///
/// Two different paths with the same file name map to the same identity and
/// are indistinguishable to the engine.
pub fn derive_process_name(path: &str) -> ProcessIdentity {
    let file_name = path.rsplit(['\\', '/']).next().unwrap_or_default();
    let stem = match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() => &file_name[..idx],
        _ => file_name,
    };
    if stem.is_empty() {
        ProcessIdentity::from(UNKNOWN_IDENTITY)
    } else {
        ProcessIdentity::from(stem)
    }
}

/// Reconciles tracked executable paths against the OS process table.
///
/// Every OS call runs on the blocking pool under `query_timeout`. Query
/// failures and timeouts degrade to "nothing is running"; launch and stop
/// failures are logged and never returned.
pub struct ProcessEngine {
    backend: Arc<dyn ProcessBackend>,
    query_timeout: Duration,
}

impl ProcessEngine {
    pub fn new(backend: Arc<dyn ProcessBackend>, query_timeout: Duration) -> Self {
        Self {
            backend,
            query_timeout,
        }
    }

    /// Returns the subset of `candidates` with at least one running process.
    pub async fn list_running_processes(
        &self,
        candidates: &HashSet<ProcessIdentity>,
    ) -> HashSet<ProcessIdentity> {
        if candidates.is_empty() {
            return HashSet::new();
        }
        self.snapshot()
            .await
            .into_iter()
            .flat_map(|record| record.identities())
            .filter(|identity| candidates.contains(identity))
            .collect()
    }

    /// Running processes a user could choose to track.
    pub async fn list_all_tracked_processes(
        &self,
        filter: &ProcessFilter,
        search: Option<&str>,
    ) -> Vec<RunningProcessInfo> {
        let records = self.snapshot().await;
        filter_tracked_processes(records, filter, search)
    }

    pub async fn is_running(&self, path: &str) -> bool {
        let identity = derive_process_name(path);
        let candidates = HashSet::from([identity.clone()]);
        self.list_running_processes(&candidates)
            .await
            .contains(&identity)
    }

    /// Running state for each path, aligned with the input order.
    pub async fn run_states(&self, paths: &[String]) -> Vec<bool> {
        let identities: Vec<ProcessIdentity> =
            paths.iter().map(|path| derive_process_name(path)).collect();
        let candidates: HashSet<ProcessIdentity> = identities.iter().cloned().collect();
        let running = self.list_running_processes(&candidates).await;
        identities
            .iter()
            .map(|identity| running.contains(identity))
            .collect()
    }

    /// Icon and running state for each path, aligned with the input order.
    pub async fn app_list_details(
        &self,
        paths: &[String],
        icons: Arc<dyn IconSource>,
    ) -> Vec<AppLiveData> {
        let states = self.run_states(paths).await;
        let owned: Vec<String> = paths.to_vec();
        let icon_task = tokio::task::spawn_blocking(move || {
            owned
                .iter()
                .map(|path| icons.icon_for(Path::new(path)))
                .collect::<Vec<_>>()
        });
        let icon_list = match icon_task.await {
            Ok(list) => list,
            Err(err) => {
                warn!("icon task failed: {err}");
                vec![None; paths.len()]
            }
        };

        states
            .into_iter()
            .zip(icon_list)
            .map(|(is_running, icon)| AppLiveData { icon, is_running })
            .collect()
    }

    /// Starts every path whose identity is not already running. The running
    /// set is queried once for the whole batch.
    pub async fn launch(&self, paths: &[String]) {
        if paths.is_empty() {
            return;
        }
        let states = self.run_states(paths).await;
        let to_spawn: Vec<PathBuf> = paths
            .iter()
            .zip(states)
            .filter_map(|(path, running)| {
                if running {
                    debug!("{path} is already running, skipping");
                    None
                } else {
                    Some(PathBuf::from(path))
                }
            })
            .collect();
        if to_spawn.is_empty() {
            return;
        }

        let backend = Arc::clone(&self.backend);
        let task = tokio::task::spawn_blocking(move || {
            for path in &to_spawn {
                match backend.spawn_detached(path) {
                    Ok(()) => info!("launched {:?}", path),
                    Err(err) => warn!("failed to launch {:?}: {err:#}", path),
                }
            }
        });
        if let Err(err) = task.await {
            warn!("launch task failed: {err}");
        }
    }

    /// Best-effort bulk terminate by identity. Stopping something that is not
    /// running is not an error.
    pub async fn stop(&self, paths: &[String]) {
        if paths.is_empty() {
            return;
        }
        let mut names: Vec<ProcessIdentity> =
            paths.iter().map(|path| derive_process_name(path)).collect();
        names.sort();
        names.dedup();
        debug!(
            "stopping {}",
            names.iter().map(ProcessIdentity::as_str).collect::<Vec<_>>().join(", ")
        );

        let backend = Arc::clone(&self.backend);
        let task = tokio::task::spawn_blocking(move || backend.terminate_by_name(&names));
        match tokio::time::timeout(self.query_timeout, task).await {
            Ok(Ok(Ok(count))) => info!("stop signalled {count} processes"),
            Ok(Ok(Err(err))) => debug!("stop request failed: {err:#}"),
            Ok(Err(err)) => debug!("stop task failed: {err}"),
            Err(_) => debug!("stop request timed out after {:?}", self.query_timeout),
        }
    }

    async fn snapshot(&self) -> Vec<ProcessRecord> {
        let backend = Arc::clone(&self.backend);
        let task = tokio::task::spawn_blocking(move || backend.snapshot());
        match tokio::time::timeout(self.query_timeout, task).await {
            Ok(Ok(Ok(records))) => records,
            Ok(Ok(Err(err))) => {
                warn!("process query failed: {err:#}");
                Vec::new()
            }
            Ok(Err(err)) => {
                warn!("process query task failed: {err}");
                Vec::new()
            }
            Err(_) => {
                warn!("process query timed out after {:?}", self.query_timeout);
                Vec::new()
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::test_support::StubBackend;
    use super::*;
    use crate::icons::IconSource;

    fn engine(backend: &Arc<StubBackend>) -> ProcessEngine {
        ProcessEngine::new(backend.clone(), Duration::from_secs(2))
    }

    fn ids(values: &[&str]) -> HashSet<ProcessIdentity> {
        values.iter().map(|value| ProcessIdentity::from(*value)).collect()
    }

    struct FixedIcons;

    impl IconSource for FixedIcons {
        fn icon_for(&self, path: &Path) -> Option<String> {
            Some(format!("icon:{}", path.display()))
        }
    }

    #[test]
    fn derives_lowercase_stem_after_last_separator() {
        assert_eq!(derive_process_name("C:\\Apps\\Game.exe").as_str(), "game");
        assert_eq!(derive_process_name("notes.txt").as_str(), "notes");
        assert_eq!(derive_process_name("noext").as_str(), "noext");
        assert_eq!(derive_process_name("/opt/Tools/Runner.AppImage").as_str(), "runner");
        assert_eq!(derive_process_name("C:\\a.b\\archive.tar.gz").as_str(), "archive.tar");
    }

    #[test]
    fn unparseable_paths_become_unknown() {
        assert_eq!(derive_process_name("").as_str(), "unknown");
        assert_eq!(derive_process_name("C:\\Apps\\").as_str(), "unknown");
        assert_eq!(derive_process_name(".hidden").as_str(), "unknown");
    }

    #[test]
    fn trailing_dot_is_not_an_extension() {
        assert_eq!(derive_process_name("C:\\Apps\\odd.").as_str(), "odd.");
    }

    #[test]
    fn derivation_ignores_case() {
        for path in ["C:\\Apps\\Game.exe", "d:/x/MixedCase.Bin", "plain", "Über.exe"] {
            assert_eq!(
                derive_process_name(path),
                derive_process_name(&path.to_uppercase())
            );
        }
    }

    #[test]
    fn same_basename_in_different_directories_collides() {
        assert_eq!(
            derive_process_name("C:\\One\\tool.exe"),
            derive_process_name("D:\\Two\\TOOL.EXE")
        );
    }

    #[tokio::test]
    async fn running_set_is_subset_of_candidates() {
        let backend = Arc::new(StubBackend::with_running(&[
            ("notepad.exe", "C:\\Windows\\notepad.exe"),
            ("explorer.exe", "C:\\Windows\\explorer.exe"),
        ]));
        let running = engine(&backend)
            .list_running_processes(&ids(&["notepad", "calc"]))
            .await;
        assert_eq!(running, ids(&["notepad"]));
    }

    #[tokio::test]
    async fn no_matches_is_empty_not_an_error() {
        let backend = Arc::new(StubBackend::with_running(&[("bash", "/bin/bash")]));
        let running = engine(&backend)
            .list_running_processes(&ids(&["calc"]))
            .await;
        assert!(running.is_empty());
    }

    #[tokio::test]
    async fn query_failure_reads_as_not_running() {
        let backend = Arc::new(StubBackend {
            fail_queries: true,
            ..StubBackend::with_running(&[])
        });
        let engine = engine(&backend);
        assert!(!engine.is_running("C:\\Apps\\game.exe").await);
        assert!(engine
            .list_all_tracked_processes(&ProcessFilter::default(), None)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn query_timeout_reads_as_not_running() {
        let backend = Arc::new(StubBackend {
            query_delay: Some(Duration::from_millis(400)),
            ..StubBackend::with_running(&[("game.exe", "C:\\Apps\\game.exe")])
        });
        let engine = ProcessEngine::new(backend.clone(), Duration::from_millis(50));
        assert!(!engine.is_running("C:\\Apps\\game.exe").await);
    }

    #[tokio::test]
    async fn stop_returns_once_the_timeout_expires() {
        let backend = Arc::new(StubBackend {
            query_delay: Some(Duration::from_millis(400)),
            ..StubBackend::with_running(&[("game.exe", "C:\\Apps\\game.exe")])
        });
        let engine = ProcessEngine::new(backend.clone(), Duration::from_millis(50));

        let started = std::time::Instant::now();
        engine.stop(&["C:\\Apps\\game.exe".to_string()]).await;

        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn launch_twice_spawns_once() {
        let backend = Arc::new(StubBackend::default());
        let engine = engine(&backend);
        let paths = vec!["C:\\Apps\\game.exe".to_string()];

        engine.launch(&paths).await;
        engine.launch(&paths).await;

        assert_eq!(backend.spawn_count(), 1);
    }

    #[tokio::test]
    async fn launch_queries_the_table_once_per_batch() {
        let backend = Arc::new(StubBackend::default());
        let paths: Vec<String> = (0..5).map(|i| format!("C:\\Apps\\app{i}.exe")).collect();

        engine(&backend).launch(&paths).await;

        assert_eq!(backend.snapshot_count(), 1);
        assert_eq!(backend.spawn_count(), 5);
    }

    #[tokio::test]
    async fn launch_spawns_only_stopped_apps() {
        let backend = Arc::new(StubBackend::with_running(&[("foo.exe", "C:\\A\\foo.exe")]));
        let paths = vec!["C:\\A\\foo.exe".to_string(), "C:\\B\\bar.exe".to_string()];

        engine(&backend).launch(&paths).await;

        assert_eq!(
            *backend.spawned.lock().unwrap(),
            vec![PathBuf::from("C:\\B\\bar.exe")]
        );
    }

    #[tokio::test]
    async fn launch_failure_is_not_surfaced() {
        let backend = Arc::new(StubBackend {
            fail_spawns: true,
            ..StubBackend::default()
        });
        let engine = engine(&backend);
        let paths = vec!["C:\\Missing\\gone.exe".to_string()];

        engine.launch(&paths).await;

        assert!(!engine.is_running(&paths[0]).await);
    }

    #[tokio::test]
    async fn colliding_identity_suppresses_second_launch() {
        let backend = Arc::new(StubBackend::with_running(&[("tool.exe", "C:\\One\\tool.exe")]));
        let paths = vec!["D:\\Two\\tool.exe".to_string()];

        engine(&backend).launch(&paths).await;

        assert_eq!(backend.spawn_count(), 0);
    }

    #[tokio::test]
    async fn colliding_paths_in_one_batch_are_both_spawned() {
        let backend = Arc::new(StubBackend::default());
        let paths = vec!["C:\\One\\tool.exe".to_string(), "D:\\Two\\tool.exe".to_string()];

        engine(&backend).launch(&paths).await;

        assert_eq!(backend.spawn_count(), 2);
    }

    #[tokio::test]
    async fn stop_of_stopped_process_completes() {
        let backend = Arc::new(StubBackend::default());
        engine(&backend)
            .stop(&["C:\\Apps\\game.exe".to_string()])
            .await;
        assert_eq!(
            *backend.terminated.lock().unwrap(),
            vec![vec![ProcessIdentity::from("game")]]
        );
    }

    #[tokio::test]
    async fn stop_issues_one_bulk_request() {
        let backend = Arc::new(StubBackend::with_running(&[
            ("foo.exe", "C:\\A\\foo.exe"),
            ("bar.exe", "C:\\B\\bar.exe"),
        ]));
        let engine = engine(&backend);
        let paths = vec!["C:\\A\\foo.exe".to_string(), "C:\\B\\bar.exe".to_string()];

        engine.stop(&paths).await;

        assert_eq!(backend.terminated.lock().unwrap().len(), 1);
        assert_eq!(engine.run_states(&paths).await, vec![false, false]);
    }

    #[tokio::test]
    async fn details_follow_input_order() {
        let backend = Arc::new(StubBackend::with_running(&[
            ("zeta.exe", "C:\\Z\\zeta.exe"),
            ("foo.exe", "C:\\A\\foo.exe"),
        ]));
        let paths = vec![
            "C:\\A\\foo.exe".to_string(),
            "C:\\B\\bar.exe".to_string(),
            "C:\\Z\\zeta.exe".to_string(),
        ];

        let details = engine(&backend)
            .app_list_details(&paths, Arc::new(FixedIcons))
            .await;

        let running: Vec<bool> = details.iter().map(|entry| entry.is_running).collect();
        assert_eq!(running, vec![true, false, true]);
        assert_eq!(details[1].icon.as_deref(), Some("icon:C:\\B\\bar.exe"));
    }

    #[tokio::test]
    async fn tracked_scenario_reports_and_launches_only_missing_app() {
        let backend = Arc::new(StubBackend::with_running(&[("foo.exe", "C:\\A\\foo.exe")]));
        let engine = engine(&backend);
        let paths = vec!["C:\\A\\foo.exe".to_string(), "C:\\B\\bar.exe".to_string()];

        let details = engine.app_list_details(&paths, Arc::new(FixedIcons)).await;
        assert_eq!(
            details.iter().map(|entry| entry.is_running).collect::<Vec<_>>(),
            vec![true, false]
        );

        engine.launch(&paths).await;
        assert_eq!(
            *backend.spawned.lock().unwrap(),
            vec![PathBuf::from("C:\\B\\bar.exe")]
        );
    }
}
