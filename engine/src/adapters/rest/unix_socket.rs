//! Unix socket transport for the control plane
//!
//! Local daemon communication over a filesystem socket: no port consumption,
//! permissions enforced by the filesystem.

use crate::constants::control;
use crate::domain::{Error, Result};
use axum::Router;
use hyper::server::accept;
use std::path::Path;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serves `app` on a Unix domain socket at `socket_path` until `shutdown`
/// fires. A leftover socket file from a previous run is unlinked before
/// binding; the live socket gets mode 0660.
pub async fn serve_on_unix_socket(
    socket_path: &Path,
    app: Router,
    shutdown: CancellationToken,
) -> Result<()> {
    if socket_path.exists() {
        info!(socket = %socket_path.display(), "Removing existing socket file");
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let listener = UnixListener::bind(socket_path).map_err(|e| Error::Bind {
        path: socket_path.to_path_buf(),
        detail: e.to_string(),
    })?;

    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(control::SOCKET_MODE);
        std::fs::set_permissions(socket_path, permissions)?;
    }

    info!(socket = %socket_path.display(), "Control server listening");

    let stream = UnixListenerStream::new(listener);
    axum::Server::builder(accept::from_stream(stream))
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;

    if socket_path.exists() {
        info!(socket = %socket_path.display(), "Cleaning up socket file");
        let _ = std::fs::remove_file(socket_path);
    }

    Ok(())
}
