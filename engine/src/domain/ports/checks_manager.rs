//! Checks manager port
//! One operation surface with two implementations: the supervisor executes
//! directly, the control client relays over the daemon socket. The CLI picks
//! one based on daemon liveness, so both modes share a single contract.

use crate::domain::{Error, Result};
use async_trait::async_trait;

#[async_trait]
pub trait ChecksManager: Send + Sync {
    /// Puts the check back under supervision.
    async fn monitor(&self, id: &str) -> Result<()>;

    /// Pauses supervision without deleting the check.
    async fn unmonitor(&self, id: &str) -> Result<()>;

    async fn start(&self, id: &str) -> Result<()>;
    async fn stop(&self, id: &str) -> Result<()>;
    async fn restart(&self, id: &str) -> Result<()>;

    // Bulk forms fail softly: per-check errors are collected, iteration
    // never aborts.
    async fn monitor_all(&self) -> Vec<Error>;
    async fn unmonitor_all(&self) -> Vec<Error>;
    async fn start_all(&self) -> Vec<Error>;
    async fn stop_all(&self) -> Vec<Error>;
    async fn restart_all(&self) -> Vec<Error>;

    /// Multi-line status block, optionally narrowed to one check.
    async fn status_text(&self, id: Option<&str>) -> Result<String>;

    /// One line per check, optionally narrowed to one check.
    async fn summary_text(&self, id: Option<&str>) -> Result<String>;
}
