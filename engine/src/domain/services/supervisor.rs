//! Supervisor
//! Owns the live check set and drives it: the periodic evaluation loop, the
//! state-database projection, atomic reload, and the direct operation
//! surface mirrored over the control socket.

use crate::constants::{check as check_defaults, env as env_vars, tick};
use crate::domain::entities::Check;
use crate::domain::ports::ChecksManager;
use crate::domain::services::{ConfigParser, ExecGuard, Loader, Validator};
use crate::domain::value_objects::format_duration;
use crate::domain::{Error, Result};
use crate::infrastructure::fs::ensure_safe_permissions;
use crate::infrastructure::{StateDb, StateEntry};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Basic settings the supervisor is built from.
#[derive(Debug, Clone, Default)]
pub struct SupervisorConfig {
    pub control_file: PathBuf,
    pub pid_file: PathBuf,
    pub state_file: PathBuf,
    pub socket_file: Option<PathBuf>,
    pub log_file: String,
    pub check_interval: Option<Duration>,
}

/// Process operations that run through the execution guard when issued over
/// the control socket.
#[derive(Debug, Clone, Copy)]
pub enum ProcessOp {
    Start,
    Stop,
    Restart,
}

impl ProcessOp {
    pub fn verb(&self) -> &'static str {
        match self {
            ProcessOp::Start => "start",
            ProcessOp::Stop => "stop",
            ProcessOp::Restart => "restart",
        }
    }
}

pub struct Supervisor {
    pid: u32,
    pid_file: PathBuf,
    log_file: String,
    control_file: PathBuf,
    check_interval: Duration,
    start_time: SystemTime,
    socket_file: Mutex<Option<PathBuf>>,
    last_check: Mutex<Option<SystemTime>>,
    checks: RwLock<Vec<Arc<Check>>>,
    db: StateDb,
    guard: ExecGuard,
}

impl Supervisor {
    /// Builds a supervisor from `config`: loads the state database, parses
    /// the control file (after enforcing safe permissions on it) and seeds
    /// each check's monitored flag from its prior state.
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        let db = match StateDb::open(&config.state_file) {
            Ok(db) => db,
            Err(e) => {
                warn!(
                    file = %config.state_file.display(),
                    error = %e,
                    "Error loading state database"
                );
                StateDb::new(&config.state_file)
            }
        };

        let supervisor = Self {
            pid: std::process::id(),
            pid_file: config.pid_file,
            log_file: config.log_file,
            control_file: config.control_file,
            check_interval: config.check_interval.unwrap_or(tick::FALLBACK_INTERVAL),
            start_time: SystemTime::now(),
            socket_file: Mutex::new(None),
            last_check: Mutex::new(None),
            checks: RwLock::new(Vec::new()),
            db,
            guard: ExecGuard::new(),
        };

        if !supervisor.control_file.as_os_str().is_empty() {
            ensure_safe_permissions(&supervisor.control_file)?;
            let mut loader = Loader::new(&supervisor);
            ConfigParser::parse_file(&supervisor.control_file, &mut loader)?;
        }

        // A socket path given on the command line wins over the control file.
        if config.socket_file.is_some() {
            *supervisor.socket_file.lock().unwrap() = config.socket_file;
        }

        Ok(supervisor)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn socket_file(&self) -> Option<PathBuf> {
        self.socket_file.lock().unwrap().clone()
    }

    pub(crate) fn set_socket_file(&self, path: PathBuf) {
        *self.socket_file.lock().unwrap() = Some(path);
    }

    /// Time since the supervisor started.
    pub fn uptime(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::ZERO)
    }

    pub fn last_check(&self) -> Option<SystemTime> {
        *self.last_check.lock().unwrap()
    }

    /// Snapshot of the live check set. Reload swaps the whole set, so a
    /// snapshot observes either the old or the new configuration in full.
    pub fn snapshot(&self) -> Vec<Arc<Check>> {
        self.checks.read().unwrap().clone()
    }

    pub fn find_check(&self, id: &str) -> Option<Arc<Check>> {
        self.snapshot().into_iter().find(|c| c.id() == id)
    }

    fn find_process_check(&self, id: &str) -> Result<Arc<Check>> {
        let check = self
            .find_check(id)
            .ok_or_else(|| Error::CheckNotFound(id.to_string()))?;
        if check.as_process().is_none() {
            return Err(Error::NotAProcess(id.to_string()));
        }
        Ok(check)
    }

    /// Registers a new check, refusing id conflicts.
    pub fn add_check(&self, check: Check) -> Result<()> {
        if self.find_check(check.id()).is_some() {
            return Err(Error::DuplicateCheck(check.id().to_string()));
        }
        let check = self.attach(check);
        self.checks.write().unwrap().push(check);
        Ok(())
    }

    /// Finalises a parsed check and seeds its monitored flag from the state
    /// database, defaulting to monitored for unseen ids.
    fn attach(&self, mut check: Check) -> Arc<Check> {
        check.initialize();
        match self.db.entry(check.id()) {
            Some(entry) => check.set_monitored(entry.monitored),
            None => self.db.set_entry(StateEntry {
                id: check.id().to_string(),
                monitored: check.is_monitored(),
                data_collected_at: SystemTime::now(),
                uptime: Duration::ZERO,
            }),
        }
        Arc::new(check)
    }

    /// Projects live state into the database and rewrites it on disk:
    /// upsert every live check, drop stale keys.
    pub fn sync_state_db(&self) -> Result<()> {
        let now = SystemTime::now();
        let mut live: HashSet<String> = HashSet::new();
        for check in self.snapshot() {
            self.db.set_entry(StateEntry {
                id: check.id().to_string(),
                monitored: check.is_monitored(),
                data_collected_at: now,
                uptime: check.uptime(),
            });
            live.insert(check.id().to_string());
        }
        for key in self.db.keys() {
            if !live.contains(&key) {
                self.db.delete(&key);
            }
        }
        self.db.serialize()
    }

    /// Re-parses the control file and atomically replaces the live check set.
    /// Validation failure leaves the current set untouched.
    pub fn reload(&self) -> Result<()> {
        info!("Reloading");
        let mut validator = Validator::new();
        let parsed = ConfigParser::parse_file(&self.control_file, &mut validator);
        if parsed.is_err() || !validator.success() {
            warn!("Refusing to reload incorrect configuration");
            return Err(Error::ReloadRefused);
        }

        info!("Configuration validates, loading it...");
        let staged: Vec<Arc<Check>> = validator
            .into_checks()
            .into_iter()
            .map(|check| self.attach(check))
            .collect();
        *self.checks.write().unwrap() = staged;

        if let Err(e) = self.sync_state_db() {
            warn!(error = %e, "Error updating state database");
        }
        Ok(())
    }

    /// One tick: stamp the pass and submit every monitored check's periodic
    /// action through the execution guard, fire-and-forget.
    pub fn perform(&self) {
        debug!("Performing checks");
        *self.last_check.lock().unwrap() = Some(SystemTime::now());
        for check in self.snapshot() {
            if !check.is_monitored() {
                continue;
            }
            let timeout = check.timeout() + check_defaults::GUARD_GRACE;
            let unique_id = check.unique_id();
            let target = check.clone();
            self.guard
                .submit(&unique_id, timeout, async move { target.perform().await });
        }
    }

    /// Runs the supervision loop until `shutdown` fires. Each tick runs on
    /// its own task; the guard prevents pile-up on slow checks.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval = ?self.check_interval, "Supervision loop started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let supervisor = Arc::clone(&self);
            tokio::spawn(async move {
                if std::env::var(env_vars::DEBUG).map(|v| !v.is_empty()).unwrap_or(false) {
                    debug!("{}", supervisor.runtime_debug_stats());
                }
                supervisor.perform();
                if let Err(e) = supervisor.sync_state_db() {
                    warn!(error = %e, "Error updating state database");
                }
            });
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.check_interval) => {}
            }
        }
        info!("Supervision loop stopped");
    }

    /// Submits a process operation through the execution guard, refusing it
    /// when another operation for the same check is still in flight.
    pub fn spawn_guarded(self: Arc<Self>, op: ProcessOp, id: &str) -> Result<()> {
        let check = self.find_process_check(id)?;
        let timeout = check.timeout() + check_defaults::GUARD_GRACE;
        let unique_id = check.unique_id();
        let supervisor = Arc::clone(&self);
        let target = id.to_string();
        let accepted = self.guard.submit(&unique_id, timeout, async move {
            let result = match op {
                ProcessOp::Start => supervisor.start(&target).await,
                ProcessOp::Stop => supervisor.stop(&target).await,
                ProcessOp::Restart => supervisor.restart(&target).await,
            };
            if let Err(e) = result {
                warn!(check = %target, op = op.verb(), error = %e, "Operation failed");
            }
        });
        if accepted {
            Ok(())
        } else {
            Err(Error::Busy(check.id().to_string()))
        }
    }

    fn runtime_debug_stats(&self) -> String {
        let rss = std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| {
                status
                    .lines()
                    .find(|line| line.starts_with("VmRSS"))
                    .map(|line| line.trim_start_matches("VmRSS:").trim().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "RUNTIME DEBUG:\n{:<40} {:>15}\n{:<40} {:>15}\n",
            "Registered checks",
            self.snapshot().len(),
            "Resident memory",
            rss
        )
    }

    fn selected(&self, id: Option<&str>) -> Result<Vec<Arc<Check>>> {
        match id {
            None => Ok(self.snapshot()),
            Some(id) => {
                let check = self
                    .find_check(id)
                    .ok_or_else(|| Error::CheckNotFound(id.to_string()))?;
                Ok(vec![check])
            }
        }
    }

    fn monitor_check(&self, check: &Check, monitored: bool) -> Result<()> {
        check.set_monitored(monitored);
        self.sync_state_db()
    }
}

#[async_trait]
impl ChecksManager for Supervisor {
    async fn monitor(&self, id: &str) -> Result<()> {
        let check = self
            .find_check(id)
            .ok_or_else(|| Error::CheckNotFound(id.to_string()))?;
        self.monitor_check(&check, true)
    }

    async fn unmonitor(&self, id: &str) -> Result<()> {
        let check = self
            .find_check(id)
            .ok_or_else(|| Error::CheckNotFound(id.to_string()))?;
        self.monitor_check(&check, false)
    }

    async fn start(&self, id: &str) -> Result<()> {
        let check = self.find_process_check(id)?;
        if let Some(process) = check.as_process() {
            process.start().await?;
        }
        if let Err(e) = self.sync_state_db() {
            warn!(error = %e, "Error updating state database");
        }
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let check = self.find_process_check(id)?;
        if let Some(process) = check.as_process() {
            process.stop().await?;
        }
        if let Err(e) = self.sync_state_db() {
            warn!(error = %e, "Error updating state database");
        }
        Ok(())
    }

    async fn restart(&self, id: &str) -> Result<()> {
        let check = self.find_process_check(id)?;
        if let Some(process) = check.as_process() {
            process.restart().await?;
        }
        if let Err(e) = self.sync_state_db() {
            warn!(error = %e, "Error updating state database");
        }
        Ok(())
    }

    async fn monitor_all(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        for check in self.snapshot() {
            if let Err(e) = self.monitor_check(&check, true) {
                errors.push(e);
            }
        }
        errors
    }

    async fn unmonitor_all(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        for check in self.snapshot() {
            if let Err(e) = self.monitor_check(&check, false) {
                errors.push(e);
            }
        }
        errors
    }

    async fn start_all(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        for check in self.snapshot() {
            if let Some(process) = check.as_process() {
                if let Err(e) = process.start().await {
                    errors.push(e);
                }
            }
        }
        if let Err(e) = self.sync_state_db() {
            warn!(error = %e, "Error updating state database");
        }
        errors
    }

    async fn stop_all(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        for check in self.snapshot() {
            if let Some(process) = check.as_process() {
                if let Err(e) = process.stop().await {
                    errors.push(e);
                }
            }
        }
        if let Err(e) = self.sync_state_db() {
            warn!(error = %e, "Error updating state database");
        }
        errors
    }

    async fn restart_all(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        for check in self.snapshot() {
            if let Some(process) = check.as_process() {
                if let Err(e) = process.restart().await {
                    errors.push(e);
                }
            }
        }
        if let Err(e) = self.sync_state_db() {
            warn!(error = %e, "Error updating state database");
        }
        errors
    }

    async fn status_text(&self, id: Option<&str>) -> Result<String> {
        let checks = self.selected(id)?;
        let last_check = match self.last_check() {
            Some(at) => format!(
                "{} ago",
                format_duration(SystemTime::now().duration_since(at).unwrap_or(Duration::ZERO))
            ),
            None => "-".to_string(),
        };
        let mut s = format!(
            "\n{:<30} {}\n{:<30} {}\n{:<30} in {}\n{:<30} {}\n{:<30} {}\n{:<30} {}\n{:<30} {}\n{:<30} {}\n",
            "Uptime",
            format_duration(self.uptime()),
            "Last Check",
            last_check,
            "Next Check",
            format_duration(self.check_interval),
            "Pid",
            self.pid,
            "Pid File",
            self.pid_file.display(),
            "Control File",
            self.control_file.display(),
            "Socket File",
            self.socket_file()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            "Log File",
            self.log_file,
        );
        for check in checks {
            s.push_str(&check.status_text());
            s.push('\n');
        }
        Ok(s)
    }

    async fn summary_text(&self, id: Option<&str>) -> Result<String> {
        let checks = self.selected(id)?;
        let mut s = format!("Uptime {}\n\n", format_duration(self.uptime()));
        for check in checks {
            s.push_str(&check.summary_text());
            s.push('\n');
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ProcessCheck;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_mode_600(path: &std::path::Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).unwrap();
    }

    fn sandbox_config(dir: &TempDir, control: &str) -> SupervisorConfig {
        let control_file = dir.path().join("wardenrc");
        write_mode_600(&control_file, control);
        SupervisorConfig {
            control_file,
            pid_file: dir.path().join("warden.pid"),
            state_file: dir.path().join("state"),
            socket_file: None,
            log_file: "-".to_string(),
            check_interval: None,
        }
    }

    fn two_services(dir: &TempDir) -> String {
        format!(
            "check process apache with pidfile {p}/apache.pid\n\
             check process mysql with pidfile {p}/mysql.pid\n",
            p = dir.path().display()
        )
    }

    #[tokio::test]
    async fn loads_checks_from_control_file() {
        let dir = TempDir::new().unwrap();
        let config = sandbox_config(&dir, &two_services(&dir));
        let supervisor = Supervisor::new(config).unwrap();
        let ids: Vec<String> = supervisor
            .snapshot()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(ids, vec!["apache", "mysql"]);
        assert!(supervisor.snapshot().iter().all(|c| c.is_monitored()));
    }

    #[tokio::test]
    async fn duplicate_registration_is_refused() {
        let dir = TempDir::new().unwrap();
        let config = sandbox_config(&dir, &two_services(&dir));
        let supervisor = Supervisor::new(config).unwrap();
        let err = supervisor
            .add_check(Check::Process(ProcessCheck::new("apache")))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateCheck(ref id) if id == "apache"));
        assert_eq!(supervisor.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn monitor_flag_round_trips_through_state_db() {
        let dir = TempDir::new().unwrap();
        let config = sandbox_config(&dir, &two_services(&dir));
        let state_file = config.state_file.clone();
        {
            let supervisor = Supervisor::new(config.clone()).unwrap();
            supervisor.unmonitor("apache").await.unwrap();
            assert!(!supervisor.find_check("apache").unwrap().is_monitored());
        }

        let reloaded = StateDb::open(&state_file).unwrap();
        assert!(!reloaded.entry("apache").unwrap().monitored);
        assert!(reloaded.entry("mysql").unwrap().monitored);

        // a fresh supervisor adopts the persisted flags
        let supervisor = Supervisor::new(config).unwrap();
        assert!(!supervisor.find_check("apache").unwrap().is_monitored());
        assert!(supervisor.find_check("mysql").unwrap().is_monitored());
    }

    #[tokio::test]
    async fn monitor_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let supervisor = Supervisor::new(sandbox_config(&dir, &two_services(&dir))).unwrap();
        supervisor.monitor("apache").await.unwrap();
        supervisor.monitor("apache").await.unwrap();
        assert!(supervisor.find_check("apache").unwrap().is_monitored());
    }

    #[tokio::test]
    async fn unknown_ids_are_reported() {
        let dir = TempDir::new().unwrap();
        let supervisor = Supervisor::new(sandbox_config(&dir, &two_services(&dir))).unwrap();
        assert!(matches!(
            supervisor.monitor("nothere").await,
            Err(Error::CheckNotFound(_))
        ));
        assert!(matches!(
            supervisor.start("nothere").await,
            Err(Error::CheckNotFound(_))
        ));
    }

    #[tokio::test]
    async fn non_process_checks_reject_process_operations() {
        let dir = TempDir::new().unwrap();
        let control = format!(
            "{}check host gateway\n",
            two_services(&dir)
        );
        let supervisor = Supervisor::new(sandbox_config(&dir, &control)).unwrap();
        match supervisor.start("gateway").await {
            Err(Error::NotAProcess(id)) => assert_eq!(id, "gateway"),
            other => panic!("expected NotAProcess, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn reload_refuses_invalid_configuration() {
        let dir = TempDir::new().unwrap();
        let config = sandbox_config(&dir, &two_services(&dir));
        let control_file = config.control_file.clone();
        let supervisor = Supervisor::new(config).unwrap();
        let before: Vec<String> = supervisor
            .snapshot()
            .iter()
            .map(|c| c.unique_id())
            .collect();

        // duplicate id makes validation fail; the live set must survive
        write_mode_600(
            &control_file,
            "check process dup with pidfile /tmp/a.pid\ncheck process dup with pidfile /tmp/b.pid\n",
        );
        assert!(matches!(supervisor.reload(), Err(Error::ReloadRefused)));
        let after: Vec<String> = supervisor
            .snapshot()
            .iter()
            .map(|c| c.unique_id())
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn reload_replaces_the_live_set() {
        let dir = TempDir::new().unwrap();
        let config = sandbox_config(&dir, &two_services(&dir));
        let control_file = config.control_file.clone();
        let supervisor = Supervisor::new(config).unwrap();

        write_mode_600(
            &control_file,
            &format!(
                "check process apache with pidfile {p}/apache.pid\n\
                 check process sample_check with pidfile {p}/sample.pid\n",
                p = dir.path().display()
            ),
        );
        supervisor.reload().unwrap();

        let ids: Vec<String> = supervisor
            .snapshot()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(ids, vec!["apache", "sample_check"]);

        // stale state entries are dropped, new ones appear
        let keys = {
            supervisor.sync_state_db().unwrap();
            StateDb::open(dir.path().join("state")).unwrap().keys()
        };
        assert_eq!(keys, vec!["apache", "sample_check"]);
    }

    #[tokio::test]
    async fn reload_gives_checks_fresh_guard_identities() {
        let dir = TempDir::new().unwrap();
        let config = sandbox_config(&dir, &two_services(&dir));
        let supervisor = Supervisor::new(config).unwrap();
        let before = supervisor.find_check("apache").unwrap().unique_id();
        supervisor.reload().unwrap();
        let after = supervisor.find_check("apache").unwrap().unique_id();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn guarded_submission_reports_busy() {
        let dir = TempDir::new().unwrap();
        let control = format!(
            "check process slow with pidfile {p}/slow.pid\n\
             start program = \"sleep 30\" with timeout 5 seconds\n",
            p = dir.path().display()
        );
        let supervisor = Arc::new(Supervisor::new(sandbox_config(&dir, &control)).unwrap());

        supervisor
            .clone()
            .spawn_guarded(ProcessOp::Start, "slow")
            .unwrap();
        match supervisor.clone().spawn_guarded(ProcessOp::Start, "slow") {
            Err(Error::Busy(id)) => assert_eq!(id, "slow"),
            other => panic!("expected Busy, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn summary_includes_every_check() {
        let dir = TempDir::new().unwrap();
        let supervisor = Supervisor::new(sandbox_config(&dir, &two_services(&dir))).unwrap();
        let summary = supervisor.summary_text(None).await.unwrap();
        assert!(summary.starts_with("Uptime "));
        assert!(summary.contains("apache"));
        assert!(summary.contains("mysql"));

        let filtered = supervisor.summary_text(Some("apache")).await.unwrap();
        assert!(filtered.contains("apache"));
        assert!(!filtered.contains("mysql"));
        assert!(matches!(
            supervisor.summary_text(Some("nope")).await,
            Err(Error::CheckNotFound(_))
        ));
    }
}
