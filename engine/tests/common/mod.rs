//! Shared sandbox for the end-to-end suites
//!
//! Each test gets its own temp directory holding the control file, state
//! database, PID files and socket. Services are real `/bin/sh` children
//! (`sleep` with a PID file), so liveness goes through the same signal-0
//! probes as production.

// not every suite uses every helper
#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use warden_engine::domain::SupervisorConfig;
use warden_engine::infrastructure::process::{is_process_running, read_pid};

pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("sandbox dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn pid_file(&self, id: &str) -> PathBuf {
        self.path().join(format!("{}.pid", id))
    }

    pub fn socket_file(&self) -> PathBuf {
        self.path().join("warden.sock")
    }

    /// Writes the control file with owner-only permissions.
    pub fn write_control(&self, contents: &str) -> PathBuf {
        let path = self.path().join("wardenrc");
        std::fs::write(&path, contents).expect("control file");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .expect("control file mode");
        path
    }

    /// A well-behaved service block: a `sleep` child whose PID lands in the
    /// sandbox, and a stop program that kills it and removes the PID file.
    pub fn service_block(&self, id: &str) -> String {
        let pid_file = self.pid_file(id);
        format!(
            "check process {id} with pidfile {pid}\n  \
             start program = \"sleep 600 & echo $! > {pid}\" with timeout 5 seconds\n  \
             stop program = \"kill $(cat {pid}); rm -f {pid}\" with timeout 5 seconds\n",
            id = id,
            pid = pid_file.display()
        )
    }

    pub fn config(&self, control_file: PathBuf, with_socket: bool) -> SupervisorConfig {
        SupervisorConfig {
            control_file,
            pid_file: self.path().join("warden.pid"),
            state_file: self.path().join("state"),
            socket_file: with_socket.then(|| self.socket_file()),
            log_file: "-".to_string(),
            check_interval: None,
        }
    }

    pub fn service_running(&self, id: &str) -> bool {
        read_pid(&self.pid_file(id))
            .map(is_process_running)
            .unwrap_or(false)
    }

    /// Kills any children left behind by a test.
    pub fn reap(&self) {
        let entries = match std::fs::read_dir(self.path()) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "pid").unwrap_or(false) {
                if let Ok(pid) = read_pid(&path) {
                    let _ = std::process::Command::new("kill")
                        .arg(pid.to_string())
                        .status();
                }
            }
        }
    }
}

/// Retries a guarded operation while the daemon reports it busy. Guard slots
/// are held until the previous operation's future completes, which can lag
/// the observable state change by one liveness poll.
pub async fn retry_while_busy<F, Fut>(mut op: F) -> Result<(), warden_engine::domain::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), warden_engine::domain::Error>>,
{
    use warden_engine::domain::Error;
    let deadline = std::time::Instant::now() + Duration::from_secs(15);
    loop {
        let busy = match op().await {
            Err(Error::Busy(_)) => true,
            Err(Error::Remote(msg)) if msg.contains("already in progress") => true,
            other => return other,
        };
        if busy && std::time::Instant::now() >= deadline {
            return Err(Error::Transport("still busy after 15s".to_string()));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Polls `cond` until it holds or `timeout` elapses.
pub async fn eventually<F>(mut cond: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    cond()
}
