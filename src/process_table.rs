use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::Result;
use log::debug;
use sysinfo::{Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

use crate::{
    config::AppConfig,
    execute,
    models::{ProcessIdentity, RunningProcessInfo},
    process_core::derive_process_name,
};

/// One row of the OS process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub name: String,
    pub exe: Option<PathBuf>,
}

impl ProcessRecord {
    /// Identities this process answers to: its reported name and, when known,
    /// its executable's file name. Linux truncates the reported name to 15
    /// bytes, and a script reports its own name while `exe` is the interpreter.
    pub fn identities(&self) -> Vec<ProcessIdentity> {
        let mut identities = vec![derive_process_name(&self.name)];
        if let Some(exe) = &self.exe {
            let from_exe = derive_process_name(&exe.to_string_lossy());
            if !identities.contains(&from_exe) {
                identities.push(from_exe);
            }
        }
        identities
    }

    pub fn answers_to(&self, names: &[ProcessIdentity]) -> bool {
        self.identities()
            .iter()
            .any(|identity| names.contains(identity))
    }
}

/// Blocking OS capabilities the engine needs. Implementations are called from
/// the blocking pool, never from the async executor directly.
pub trait ProcessBackend: Send + Sync + 'static {
    fn snapshot(&self) -> Result<Vec<ProcessRecord>>;

    fn spawn_detached(&self, path: &Path) -> Result<()>;

    /// Terminates every process whose identity is in `names`. Returns how many
    /// processes were signalled.
    fn terminate_by_name(&self, names: &[ProcessIdentity]) -> Result<usize>;
}

/// [`ProcessBackend`] over the live OS process table.
#[derive(Debug, Default)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    fn refreshed_system() -> System {
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet),
        );
        sys
    }

    fn record(process: &Process) -> ProcessRecord {
        ProcessRecord {
            name: process.name().to_string_lossy().into_owned(),
            exe: process.exe().map(Path::to_path_buf),
        }
    }
}

/// Zombies have exited and only wait to be reaped, so they are not running.
fn is_live(status: ProcessStatus) -> bool {
    !matches!(status, ProcessStatus::Zombie | ProcessStatus::Dead)
}

impl ProcessBackend for SystemProcessTable {
    fn snapshot(&self) -> Result<Vec<ProcessRecord>> {
        let sys = Self::refreshed_system();
        let records: Vec<ProcessRecord> = sys
            .processes()
            .values()
            .filter(|process| is_live(process.status()))
            .map(Self::record)
            .collect();
        debug!("process snapshot has {} entries", records.len());
        Ok(records)
    }

    fn spawn_detached(&self, path: &Path) -> Result<()> {
        execute::spawn_detached(path)
    }

    fn terminate_by_name(&self, names: &[ProcessIdentity]) -> Result<usize> {
        let sys = Self::refreshed_system();
        let mut signalled = 0usize;
        for process in sys.processes().values() {
            if !is_live(process.status()) || !Self::record(process).answers_to(names) {
                continue;
            }
            if process.kill() {
                signalled += 1;
            }
        }
        Ok(signalled)
    }
}

/// Inclusion rules for the "pick a running process" listing.
#[derive(Debug, Clone, Default)]
pub struct ProcessFilter {
    excluded_fragments: Vec<String>,
    extensions: Vec<String>,
}

impl ProcessFilter {
    pub fn new<I, J>(excluded_fragments: I, extensions: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        Self {
            excluded_fragments: excluded_fragments
                .into_iter()
                .map(|value| value.to_lowercase())
                .filter(|value| !value.is_empty())
                .collect(),
            extensions: extensions
                .into_iter()
                .map(|value| value.trim_start_matches('.').to_lowercase())
                .filter(|value| !value.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.excluded_path_fragments.clone(),
            config.executable_extensions.clone(),
        )
    }

    fn accepts(&self, path_lower: &str) -> bool {
        if self
            .excluded_fragments
            .iter()
            .any(|fragment| path_lower.contains(fragment.as_str()))
        {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        let file_name = path_lower.rsplit(['\\', '/']).next().unwrap_or_default();
        file_name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| self.extensions.iter().any(|allowed| allowed == ext))
    }
}

/// Reduces a raw snapshot to the entries offered for tracking.
pub fn filter_tracked_processes(
    records: Vec<ProcessRecord>,
    filter: &ProcessFilter,
    search: Option<&str>,
) -> Vec<RunningProcessInfo> {
    let search_lower = search
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase);

    let mut seen_paths: HashSet<String> = HashSet::new();
    let mut results = Vec::new();
    for record in records {
        let Some(exe) = record.exe else {
            continue;
        };
        let path = exe.to_string_lossy().into_owned();
        if path.trim().is_empty() {
            continue;
        }
        let path_lower = path.to_lowercase();
        if !filter.accepts(&path_lower) {
            continue;
        }
        if !seen_paths.insert(path_lower.clone()) {
            continue;
        }

        let name = display_process_name(&record.name);
        if let Some(needle) = &search_lower {
            if !name.to_lowercase().contains(needle.as_str()) && !path_lower.contains(needle.as_str()) {
                continue;
            }
        }
        results.push(RunningProcessInfo { name, path });
    }

    results.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.path.cmp(&b.path))
    });
    results
}

fn display_process_name(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.eq_ignore_ascii_case("exe") =>
        {
            stem.to_string()
        }
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, exe: Option<&str>) -> ProcessRecord {
        ProcessRecord {
            name: name.to_string(),
            exe: exe.map(PathBuf::from),
        }
    }

    fn windows_filter() -> ProcessFilter {
        ProcessFilter::new(
            vec!["\\Windows\\".to_string(), "\\Microsoft.NET\\".to_string()],
            vec!["exe".to_string()],
        )
    }

    #[test]
    fn excludes_reserved_directories_and_unresolved_paths() {
        let records = vec![
            record("svchost.exe", Some("C:\\Windows\\System32\\svchost.exe")),
            record("ngen.exe", Some("C:\\WINDOWS\\Microsoft.NET\\Framework\\ngen.exe")),
            record("System", None),
            record("Spotify.exe", Some("C:\\Users\\me\\AppData\\Spotify\\Spotify.exe")),
        ];
        let listed = filter_tracked_processes(records, &windows_filter(), None);
        assert_eq!(
            listed,
            vec![RunningProcessInfo {
                name: "Spotify".into(),
                path: "C:\\Users\\me\\AppData\\Spotify\\Spotify.exe".into(),
            }]
        );
    }

    #[test]
    fn requires_configured_extension() {
        let records = vec![
            record("tool.com", Some("D:\\Tools\\tool.com")),
            record("game.exe", Some("D:\\Games\\game.EXE")),
        ];
        let listed = filter_tracked_processes(records, &windows_filter(), None);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "game");
    }

    #[test]
    fn processes_sharing_a_path_collapse_to_the_first() {
        let records = vec![
            record("chrome.exe", Some("C:\\Chrome\\chrome.exe")),
            record("Chrome.exe", Some("C:\\Chrome\\chrome.exe")),
            record("chrome.exe", Some("C:\\Chrome\\chrome.exe")),
        ];
        let listed = filter_tracked_processes(records, &windows_filter(), None);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "chrome");
    }

    #[test]
    fn search_matches_name_or_path_case_insensitively() {
        let records = vec![
            record("obs64.exe", Some("C:\\Program Files\\OBS\\obs64.exe")),
            record("discord.exe", Some("C:\\Users\\me\\Discord\\discord.exe")),
        ];
        let by_path = filter_tracked_processes(records.clone(), &windows_filter(), Some("program FILES"));
        assert_eq!(by_path.len(), 1);
        assert_eq!(by_path[0].name, "obs64");

        let by_name = filter_tracked_processes(records.clone(), &windows_filter(), Some("DISC"));
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "discord");

        let blank = filter_tracked_processes(records, &windows_filter(), Some("   "));
        assert_eq!(blank.len(), 2);
    }

    #[test]
    fn results_are_sorted_by_name() {
        let records = vec![
            record("zoom.exe", Some("C:\\Zoom\\zoom.exe")),
            record("Audacity.exe", Some("C:\\Audacity\\Audacity.exe")),
            record("mpv.exe", Some("C:\\mpv\\mpv.exe")),
        ];
        let names: Vec<String> = filter_tracked_processes(records, &windows_filter(), None)
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, vec!["Audacity", "mpv", "zoom"]);
    }

    #[test]
    fn empty_extension_list_accepts_any_executable() {
        let filter = ProcessFilter::new(vec!["/usr/lib/".to_string()], Vec::new());
        let records = vec![
            record("firefox", Some("/opt/firefox/firefox")),
            record("gvfsd", Some("/usr/lib/gvfs/gvfsd")),
        ];
        let listed = filter_tracked_processes(records, &filter, None);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "/opt/firefox/firefox");
    }

    #[test]
    fn truncated_names_still_match_through_the_executable() {
        let long = record("averyveryverylo", Some("/opt/apps/averyveryverylongappname"));
        assert!(long.answers_to(&[ProcessIdentity::from("averyveryverylongappname")]));

        let script = record("backup", Some("/usr/bin/bash"));
        assert!(script.answers_to(&[ProcessIdentity::from("backup")]));
        assert_eq!(
            record("notepad.exe", Some("C:\\Windows\\notepad.exe")).identities(),
            vec![ProcessIdentity::from("notepad")]
        );
    }

    #[test]
    fn exited_processes_are_not_live() {
        assert!(!is_live(ProcessStatus::Zombie));
        assert!(!is_live(ProcessStatus::Dead));
        assert!(is_live(ProcessStatus::Run));
        assert!(is_live(ProcessStatus::Sleep));
    }

    #[cfg(target_os = "linux")]
    mod live {
        use std::{fs, process::Command, thread, time::Duration};

        use super::*;
        use pretty_assertions::assert_eq;

        fn answering(names: &[ProcessIdentity]) -> Vec<ProcessRecord> {
            SystemProcessTable
                .snapshot()
                .unwrap()
                .into_iter()
                .filter(|record| record.answers_to(names))
                .collect()
        }

        #[test]
        fn launched_app_that_exits_is_no_longer_listed() {
            let dir = tempfile::tempdir().unwrap();
            let exe = dir.path().join("quickexit");
            fs::copy("/bin/true", &exe).unwrap();

            SystemProcessTable.spawn_detached(&exe).unwrap();
            thread::sleep(Duration::from_millis(1500));

            assert_eq!(answering(&[ProcessIdentity::from("quickexit")]), Vec::new());
        }

        #[test]
        fn unreaped_children_are_not_listed() {
            let dir = tempfile::tempdir().unwrap();
            let exe = dir.path().join("zombiecheck");
            fs::copy("/bin/true", &exe).unwrap();

            let mut child = Command::new(&exe).spawn().unwrap();
            thread::sleep(Duration::from_millis(1000));
            let listed = answering(&[ProcessIdentity::from("zombiecheck")]);
            child.wait().unwrap();

            assert_eq!(listed, Vec::new());
        }

        #[test]
        fn long_executable_names_are_found_and_stopped() {
            let dir = tempfile::tempdir().unwrap();
            let exe = dir.path().join("averyveryverylongappname");
            fs::copy("/bin/sleep", &exe).unwrap();
            let identity = derive_process_name(&exe.to_string_lossy());

            let mut child = Command::new(&exe).arg("30").spawn().unwrap();
            thread::sleep(Duration::from_millis(500));

            let listed = answering(&[identity.clone()]);
            let signalled = SystemProcessTable.terminate_by_name(&[identity]).unwrap();
            let _ = child.kill();
            child.wait().unwrap();

            assert_eq!(listed.len(), 1);
            assert_eq!(signalled, 1);
        }
    }
}
