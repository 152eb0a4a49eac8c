//! Control-plane handlers
//! Every route answers HTTP 200 with the JSON envelope `{success, msg}`;
//! failures ride in the envelope, not in the status code.

use crate::domain::{ChecksManager, Error, ProcessOp, Supervisor};
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Shared application state
pub type AppState = Arc<Supervisor>;

/// Wire envelope shared by the server and the client.
#[derive(Debug, Serialize, Deserialize)]
pub struct CmdResponse {
    pub success: bool,
    pub msg: String,
}

impl CmdResponse {
    fn ok(msg: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            msg: msg.into(),
        })
    }

    fn err(msg: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            msg: msg.into(),
        })
    }

    fn from_unit(result: Result<(), Error>) -> Json<Self> {
        match result {
            Ok(()) => Self::ok(""),
            Err(e) => Self::err(e.to_string()),
        }
    }

    fn from_errors(errors: Vec<Error>) -> Json<Self> {
        if errors.is_empty() {
            Self::ok("")
        } else {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            Self::err(msgs.join("\n"))
        }
    }
}

/// Start/stop/restart run through the execution guard: a refused submission
/// comes back as a busy envelope and the operator retries.
fn guarded(supervisor: &AppState, op: ProcessOp, id: &str) -> Json<CmdResponse> {
    debug!(op = op.verb(), check = %id, "[CLIENT_REQUEST] Requested execution");
    CmdResponse::from_unit(supervisor.clone().spawn_guarded(op, id))
}

fn guarded_all(supervisor: &AppState, op: ProcessOp) -> Json<CmdResponse> {
    debug!(op = op.verb(), "[CLIENT_REQUEST] Requested execution for all checks");
    let mut errors = Vec::new();
    for check in supervisor.snapshot() {
        // non-process checks are skipped silently in bulk process operations
        if check.as_process().is_none() {
            continue;
        }
        if let Err(e) = supervisor.clone().spawn_guarded(op, check.id()) {
            errors.push(e);
        }
    }
    CmdResponse::from_errors(errors)
}

pub async fn start_check(State(sup): State<AppState>, Path(id): Path<String>) -> Json<CmdResponse> {
    guarded(&sup, ProcessOp::Start, &id)
}

pub async fn stop_check(State(sup): State<AppState>, Path(id): Path<String>) -> Json<CmdResponse> {
    guarded(&sup, ProcessOp::Stop, &id)
}

pub async fn restart_check(
    State(sup): State<AppState>,
    Path(id): Path<String>,
) -> Json<CmdResponse> {
    guarded(&sup, ProcessOp::Restart, &id)
}

pub async fn start_all(State(sup): State<AppState>) -> Json<CmdResponse> {
    guarded_all(&sup, ProcessOp::Start)
}

pub async fn stop_all(State(sup): State<AppState>) -> Json<CmdResponse> {
    guarded_all(&sup, ProcessOp::Stop)
}

pub async fn restart_all(State(sup): State<AppState>) -> Json<CmdResponse> {
    guarded_all(&sup, ProcessOp::Restart)
}

// monitor and unmonitor only flip a flag and touch the database, so they
// stay synchronous and unguarded.

pub async fn monitor_check(
    State(sup): State<AppState>,
    Path(id): Path<String>,
) -> Json<CmdResponse> {
    debug!(check = %id, "[CLIENT_REQUEST] Requested monitor");
    CmdResponse::from_unit(sup.monitor(&id).await)
}

pub async fn unmonitor_check(
    State(sup): State<AppState>,
    Path(id): Path<String>,
) -> Json<CmdResponse> {
    debug!(check = %id, "[CLIENT_REQUEST] Requested unmonitor");
    CmdResponse::from_unit(sup.unmonitor(&id).await)
}

pub async fn monitor_all(State(sup): State<AppState>) -> Json<CmdResponse> {
    CmdResponse::from_errors(ChecksManager::monitor_all(&*sup).await)
}

pub async fn unmonitor_all(State(sup): State<AppState>) -> Json<CmdResponse> {
    CmdResponse::from_errors(ChecksManager::unmonitor_all(&*sup).await)
}

async fn text(supervisor: &AppState, what: &str, id: Option<&str>) -> Json<CmdResponse> {
    debug!(what, check = ?id, "[CLIENT_REQUEST] Requested report");
    let result = match what {
        "status" => supervisor.status_text(id).await,
        _ => supervisor.summary_text(id).await,
    };
    match result {
        Ok(msg) => CmdResponse::ok(msg),
        Err(e) => CmdResponse::err(e.to_string()),
    }
}

pub async fn status(State(sup): State<AppState>) -> Json<CmdResponse> {
    text(&sup, "status", None).await
}

pub async fn status_one(State(sup): State<AppState>, Path(id): Path<String>) -> Json<CmdResponse> {
    text(&sup, "status", Some(&id)).await
}

pub async fn summary(State(sup): State<AppState>) -> Json<CmdResponse> {
    text(&sup, "summary", None).await
}

pub async fn summary_one(State(sup): State<AppState>, Path(id): Path<String>) -> Json<CmdResponse> {
    text(&sup, "summary", Some(&id)).await
}
