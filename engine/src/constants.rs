//! Application-wide constants and default values

use std::time::Duration;

/// Check evaluation defaults
pub mod check {
    use super::Duration;

    /// Default bound for any single operation attempt on a check
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Failed start attempts before a check auto-unmonitors itself
    pub const DEFAULT_MAX_START_TRIES: u32 = 5;

    /// Poll cadence while waiting for a liveness transition
    pub const LIVENESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Extra slack the execution guard holds a slot beyond the operation timeout
    pub const GUARD_GRACE: Duration = Duration::from_secs(5);
}

/// Supervision loop defaults
pub mod tick {
    use super::Duration;

    /// Operational tick interval applied by the binaries
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(120);

    /// Fallback when no interval is configured (used by the test suites)
    pub const FALLBACK_INTERVAL: Duration = Duration::from_millis(100);
}

/// Control plane defaults
pub mod control {
    use super::Duration;

    /// Per-request client timeout
    pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Grace period before `quit` escalates from SIGTERM to SIGKILL
    pub const QUIT_GRACE: Duration = Duration::from_secs(5);

    /// Socket file permissions (owner and group read/write)
    pub const SOCKET_MODE: u32 = 0o660;
}

/// File mode ceilings and defaults
pub mod modes {
    /// Maximum permissions accepted on sensitive files (control file, state DB)
    pub const MAX_SECURE: u32 = 0o700;

    /// Mode for PID files
    pub const PID_FILE: u32 = 0o644;

    /// Mode for the state database file
    pub const STATE_FILE: u32 = 0o600;

    /// Mode for parent directories created on demand
    pub const PRIVATE_DIR: u32 = 0o700;
}

/// Default filesystem locations
pub mod paths {
    pub const CONTROL_FILE: &str = "/etc/warden/wardenrc";
    pub const PID_FILE: &str = "/var/run/warden.pid";
    pub const STATE_FILE: &str = "/var/lib/warden/state";
    pub const SOCKET_FILE: &str = "/var/run/warden.sock";
    pub const LOG_FILE: &str = "/var/log/warden.log";
}

/// Environment variables honoured by the binaries
pub mod env {
    /// Any non-empty value makes the tick loop emit runtime debug stats
    pub const DEBUG: &str = "WARDEN_DEBUG";

    /// Preserves the working directory across a daemonization handoff
    pub const DAEMON_CWD: &str = "WARDEN_DAEMON_CWD";
}
