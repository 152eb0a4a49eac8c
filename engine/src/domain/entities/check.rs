//! Check entities
//! A check is the unit of supervision. The `process` kind ties liveness to a
//! PID file and carries start/stop programs; any other kind parses into a
//! bare service check that only tracks its monitored flag.

use crate::constants::check as defaults;
use crate::domain::value_objects::format_duration;
use crate::domain::{Error, Result};
use crate::infrastructure::process::{is_process_running, read_pid, wait_until};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Monotonic discriminator so two incarnations of the same check id (before
/// and after a reload) never share an execution-guard slot.
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// State common to every check kind.
#[derive(Debug)]
pub struct CheckCommon {
    id: String,
    kind: String,
    timeout: Duration,
    monitored: AtomicBool,
    instance: u64,
}

impl CheckCommon {
    fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            timeout: defaults::DEFAULT_TIMEOUT,
            monitored: AtomicBool::new(true),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn monitored_str(&self) -> &'static str {
        if self.monitored.load(Ordering::SeqCst) {
            "monitored"
        } else {
            "Not monitored"
        }
    }
}

/// A shell command line plus the time budget for the state transition it is
/// expected to cause.
#[derive(Debug, Clone)]
pub struct Program {
    cmd: String,
    timeout: Duration,
}

impl Program {
    pub fn new(cmd: &str, timeout: Duration) -> Self {
        Self {
            cmd: unquote(cmd).to_string(),
            timeout,
        }
    }

    pub fn empty() -> Self {
        Self {
            cmd: String::new(),
            timeout: Duration::ZERO,
        }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs the command line through `/bin/sh -c`, capturing output for
    /// debug logging only.
    pub async fn exec(&self) {
        if self.cmd.is_empty() {
            return;
        }
        debug!(cmd = %self.cmd, "/bin/sh -c");
        match tokio::process::Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.cmd)
            .output()
            .await
        {
            Ok(output) => debug!(
                cmd = %self.cmd,
                status = %output.status,
                stdout = %String::from_utf8_lossy(&output.stdout).trim_end(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
                "command finished"
            ),
            Err(e) => warn!(cmd = %self.cmd, error = %e, "command failed to run"),
        }
    }
}

/// Strips enclosing double quotes.
pub fn unquote(s: &str) -> &str {
    s.trim_matches('"')
}

/// Bare check for kinds the parser recognises but does not fully support.
#[derive(Debug)]
pub struct ServiceCheck {
    common: CheckCommon,
}

impl ServiceCheck {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            common: CheckCommon::new(id, kind),
        }
    }
}

/// A check whose health predicate is "a valid PID in `pid_file` is alive".
#[derive(Debug)]
pub struct ProcessCheck {
    common: CheckCommon,
    group: Option<String>,
    pid_file: PathBuf,
    start_program: Program,
    stop_program: Program,
    started_at: Mutex<Option<SystemTime>>,
    start_attempts: AtomicU32,
    max_start_tries: u32,
}

impl ProcessCheck {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            common: CheckCommon::new(id, "process"),
            group: None,
            pid_file: PathBuf::new(),
            start_program: Program::empty(),
            stop_program: Program::empty(),
            started_at: Mutex::new(None),
            start_attempts: AtomicU32::new(0),
            max_start_tries: defaults::DEFAULT_MAX_START_TRIES,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.common.timeout = timeout;
    }

    pub fn set_group(&mut self, group: impl Into<String>) {
        self.group = Some(group.into());
    }

    pub fn set_pid_file(&mut self, path: impl Into<PathBuf>) {
        self.pid_file = path.into();
    }

    pub fn set_start_program(&mut self, program: Program) {
        self.start_program = program;
    }

    pub fn set_stop_program(&mut self, program: Program) {
        self.stop_program = program;
    }

    pub fn set_max_start_tries(&mut self, tries: u32) {
        self.max_start_tries = tries;
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn start_program(&self) -> &Program {
        &self.start_program
    }

    pub fn stop_program(&self) -> &Program {
        &self.stop_program
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    pub fn start_attempts(&self) -> u32 {
        self.start_attempts.load(Ordering::SeqCst)
    }

    /// PID read from the pid file, if present and well-formed.
    pub fn pid(&self) -> Option<i32> {
        read_pid(&self.pid_file).ok()
    }

    pub fn is_running(&self) -> bool {
        self.pid().map(is_process_running).unwrap_or(false)
    }

    /// Time since the last observed transition to running. Zero while the
    /// check is unmonitored or the process is down.
    pub fn uptime(&self) -> Duration {
        if !self.common.monitored.load(Ordering::SeqCst) || !self.is_running() {
            return Duration::ZERO;
        }
        match *self.started_at.lock().unwrap() {
            Some(at) => SystemTime::now().duration_since(at).unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }

    fn stamp_started(&self) {
        *self.started_at.lock().unwrap() = Some(SystemTime::now());
    }

    fn stamp_started_if_unset(&self) {
        let mut started_at = self.started_at.lock().unwrap();
        if started_at.is_none() {
            *started_at = Some(SystemTime::now());
        }
    }

    fn status_str(&self) -> String {
        if self.common.monitored.load(Ordering::SeqCst) {
            if self.is_running() { "Running" } else { "Stopped" }.to_string()
        } else {
            self.common.monitored_str().to_string()
        }
    }

    /// Launches the start program in the background; callers poll liveness.
    fn exec_start_in_background(&self) {
        let program = self.start_program.clone();
        let id = self.common.id.clone();
        tokio::spawn(async move {
            debug!(check = %id, "running start program");
            program.exec().await;
        });
    }

    /// Periodic action: enforce the desired state. A monitored check that is
    /// not running gets one bounded start attempt; repeated failures
    /// eventually unmonitor the check.
    pub async fn perform(&self) {
        let id = self.common.id.as_str();
        info!(check = %id, "Performing process check");
        if !self.common.monitored.load(Ordering::SeqCst) {
            return;
        }
        if self.is_running() {
            self.start_attempts.store(0, Ordering::SeqCst);
            self.stamp_started_if_unset();
            return;
        }

        info!(check = %id, "Service is not running. Starting...");
        self.exec_start_in_background();
        if wait_until(|| self.is_running(), self.start_program.timeout).await {
            self.start_attempts.store(0, Ordering::SeqCst);
            self.stamp_started();
            debug!(check = %id, "successfully started");
            return;
        }

        let attempts = self.start_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(
            check = %id,
            tries_left = self.max_start_tries.saturating_sub(attempts),
            "Timed out waiting for service to start"
        );
        if attempts >= self.max_start_tries {
            self.common.monitored.store(false, Ordering::SeqCst);
            self.start_attempts.store(0, Ordering::SeqCst);
            warn!(
                check = %id,
                tries = self.max_start_tries,
                "Check was unmonitored after repeated failed starts"
            );
        }
    }

    /// Explicit start: re-enables monitoring, launches the start program and
    /// waits up to its timeout for the process to come up.
    pub async fn start(&self) -> Result<()> {
        debug!(check = %self.common.id, "Starting");
        self.common.monitored.store(true, Ordering::SeqCst);
        if self.is_running() {
            debug!(check = %self.common.id, "already running");
            self.stamp_started_if_unset();
            return Ok(());
        }
        self.exec_start_in_background();
        if !wait_until(|| self.is_running(), self.start_program.timeout).await {
            return Err(Error::StartTimedOut(self.common.id.clone()));
        }
        self.start_attempts.store(0, Ordering::SeqCst);
        self.stamp_started();
        Ok(())
    }

    /// Explicit stop: disables monitoring first so the supervision loop does
    /// not fight the stop, then waits for the process to go away.
    pub async fn stop(&self) -> Result<()> {
        debug!(check = %self.common.id, "Stopping");
        self.common.monitored.store(false, Ordering::SeqCst);
        if !self.is_running() {
            debug!(check = %self.common.id, "already stopped");
            return Ok(());
        }
        let program = self.stop_program.clone();
        tokio::spawn(async move { program.exec().await });
        if !wait_until(|| !self.is_running(), self.stop_program.timeout).await {
            return Err(Error::StopTimedOut(self.common.id.clone()));
        }
        Ok(())
    }

    /// Stop then start; the first error short-circuits.
    pub async fn restart(&self) -> Result<()> {
        debug!(check = %self.common.id, "Restarting");
        self.stop().await?;
        self.start().await
    }

    fn summary_text(&self) -> String {
        format!("Process {:<10}{:>40}", self.common.id, self.status_str())
    }

    fn status_text(&self) -> String {
        let mut s = format!("Process '{}'\n", self.common.id);
        if self.common.monitored.load(Ordering::SeqCst) {
            s += &format!("  {:<40} {:>12}\n", "status", self.status_str());
            if let Some(pid) = self.pid().filter(|_| self.is_running()) {
                s += &format!("  {:<40} {:>12}\n", "pid", pid);
            }
            s += &format!("  {:<40} {:>12}\n", "uptime", format_duration(self.uptime()));
            s += &format!("  {:<40} {:>12}\n", "monitoring status", "monitored");
        } else {
            s += &format!("  {:<40} {:>12}\n", "monitoring status", "Not monitored");
        }
        s
    }
}

/// The unit of supervision held by the registry.
#[derive(Debug)]
pub enum Check {
    Process(ProcessCheck),
    Service(ServiceCheck),
}

impl Check {
    fn common(&self) -> &CheckCommon {
        match self {
            Check::Process(c) => &c.common,
            Check::Service(c) => &c.common,
        }
    }

    pub fn id(&self) -> &str {
        &self.common().id
    }

    pub fn kind(&self) -> &str {
        &self.common().kind
    }

    /// Guard key: distinct across instances sharing the same user-facing id.
    pub fn unique_id(&self) -> String {
        let common = self.common();
        format!("{}-{}", common.id, common.instance)
    }

    pub fn timeout(&self) -> Duration {
        self.common().timeout
    }

    pub fn is_monitored(&self) -> bool {
        self.common().monitored.load(Ordering::SeqCst)
    }

    pub fn set_monitored(&self, monitored: bool) {
        self.common().monitored.store(monitored, Ordering::SeqCst);
    }

    pub fn as_process(&self) -> Option<&ProcessCheck> {
        match self {
            Check::Process(c) => Some(c),
            Check::Service(_) => None,
        }
    }

    pub fn uptime(&self) -> Duration {
        match self {
            Check::Process(c) => c.uptime(),
            Check::Service(_) => Duration::ZERO,
        }
    }

    /// Fills unconfigured attributes before the check goes live: program
    /// timeouts default to the check timeout, and a process already running
    /// at registration gets its start timestamp.
    pub fn initialize(&mut self) {
        if let Check::Process(c) = self {
            if c.start_program.timeout.is_zero() {
                c.start_program.timeout = c.common.timeout;
            }
            if c.stop_program.timeout.is_zero() {
                c.stop_program.timeout = c.common.timeout;
            }
            if c.is_running() {
                c.stamp_started();
            }
        }
        self.common().monitored.store(true, Ordering::SeqCst);
    }

    pub async fn perform(&self) {
        match self {
            Check::Process(c) => c.perform().await,
            Check::Service(c) => info!(check = %c.common.id, "Performing check"),
        }
    }

    /// One line: kind, id and current status.
    pub fn summary_text(&self) -> String {
        match self {
            Check::Process(c) => c.summary_text(),
            Check::Service(c) => {
                format!("Check '{}'{:>40}", c.common.id, c.common.monitored_str())
            }
        }
    }

    /// Multi-line status block.
    pub fn status_text(&self) -> String {
        match self {
            Check::Process(c) => c.status_text(),
            Check::Service(c) => format!(
                "Check {}\n  monitoring status {:>40}\n",
                c.common.id,
                c.common.monitored_str()
            ),
        }
    }
}
