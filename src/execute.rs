use std::{
    path::Path,
    process::{Child, Command, Stdio},
};

#[cfg(unix)]
use std::thread;

use anyhow::{bail, Context, Result};
#[cfg(unix)]
use log::{debug, warn};

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Starts `path` as an independent process. The launcher never kills it and
/// does not report its exit.
pub fn spawn_detached(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!("executable does not exist: {}", path.display());
    }

    let mut command = detached_command(path);
    let child = command
        .spawn()
        .with_context(|| format!("failed to start {}", path.display()))?;
    release(child);
    Ok(())
}

/// On Unix the child stays our child until reaped, and an unreaped exit
/// lingers as a zombie in the process table.
#[cfg(unix)]
fn release(mut child: Child) {
    let pid = child.id();
    let reaper = thread::Builder::new()
        .name(format!("reap-{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) => debug!("launched process {pid} exited with {status}"),
            Err(err) => debug!("failed to wait on launched process {pid}: {err}"),
        });
    if let Err(err) = reaper {
        warn!("failed to start reaper for process {pid}: {err}");
    }
}

#[cfg(not(unix))]
fn release(child: Child) {
    drop(child);
}

fn detached_command(path: &Path) -> Command {
    let mut command = Command::new(path);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        command.current_dir(parent);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_fails_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-here.exe");
        let err = spawn_detached(&missing).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn command_runs_from_the_executable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("tool");
        let command = detached_command(&exe);
        assert_eq!(command.get_current_dir(), Some(dir.path()));
        assert_eq!(command.get_program(), exe.as_os_str());
        assert_eq!(command.get_args().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn spawns_a_real_executable() {
        spawn_detached(Path::new("/bin/sh")).unwrap();
    }
}
