//! Route table for the control socket

use super::handlers::{self, AppState};
use axum::routing::{get, post};
use axum::Router;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/start/:id", post(handlers::start_check))
        .route("/stop/:id", post(handlers::stop_check))
        .route("/restart/:id", post(handlers::restart_check))
        .route("/monitor/:id", post(handlers::monitor_check))
        .route("/unmonitor/:id", post(handlers::unmonitor_check))
        .route("/start_all", post(handlers::start_all))
        .route("/stop_all", post(handlers::stop_all))
        .route("/restart_all", post(handlers::restart_all))
        .route("/monitor_all", post(handlers::monitor_all))
        .route("/unmonitor_all", post(handlers::unmonitor_all))
        .route("/status", get(handlers::status))
        .route("/status/:id", get(handlers::status_one))
        .route("/summary", get(handlers::summary))
        .route("/summary/:id", get(handlers::summary_one))
        .with_state(state)
}
