//! Process primitives
//! PID-file handling and signal-0 liveness probes. Supervised processes are
//! never children of the daemon; the PID file is the only contract.

use crate::constants::{check, modes};
use crate::domain::{Error, Result};
use crate::infrastructure::fs::{file_exists, is_file, is_writable};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

/// Parses a PID from the first non-blank line of `path`.
///
/// Fails with distinct errors for a missing file, an unreadable file and a
/// first line that is not a positive integer.
pub fn read_pid(path: &Path) -> Result<i32> {
    if !file_exists(path) {
        return Err(Error::PidFileMissing(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path).map_err(|source| Error::PidFileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let first_line = contents.trim().lines().next().unwrap_or("").trim();
    first_line
        .parse::<u32>()
        .ok()
        .filter(|pid| *pid > 0)
        .map(|pid| pid as i32)
        .ok_or_else(|| Error::MalformedPidFile(path.to_path_buf()))
}

/// Succeeds iff `path` either does not exist but its parent directory is
/// writable, or exists as a writable regular file.
pub fn validate_pid_file_path(path: &Path) -> Result<()> {
    if file_exists(path) && !is_file(path) {
        return Err(Error::PidPathNotAFile(path.to_path_buf()));
    }
    if !is_writable(path) {
        return Err(Error::PidPathNotWritable(path.to_path_buf()));
    }
    Ok(())
}

/// Writes `pid` to `path` with mode 0644, replacing the file atomically.
pub fn write_pid(path: &Path, pid: i32) -> Result<()> {
    validate_pid_file_path(path)?;
    let tmp = path.with_extension("tmp");
    let write = || -> std::io::Result<()> {
        std::fs::write(&tmp, pid.to_string())?;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(modes::PID_FILE))?;
        std::fs::rename(&tmp, path)
    };
    write().map_err(|source| Error::PidFileWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Probes `pid` with signal 0. An EPERM response still means the process is
/// alive; any other error means it is gone. Non-positive PIDs are never
/// considered running (kill(0)/kill(-n) would address process groups).
pub fn is_process_running(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Polls `cond` every 500 ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(mut cond: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        let step = check::LIVENESS_POLL_INTERVAL.min(deadline - now);
        tokio::time::sleep(step).await;
    }
}
