//! Control client
//! Mirrors the `ChecksManager` surface over the daemon socket so the CLI can
//! transparently switch between in-daemon and direct modes. Each request is
//! a short-lived HTTP/1 exchange over a fresh `UnixStream`.

use crate::adapters::rest::CmdResponse;
use crate::constants::control;
use crate::domain::{ChecksManager, Error, Result};
use async_trait::async_trait;
use hyper::{Body, Method, Request, StatusCode};
use std::path::PathBuf;
use tokio::net::UnixStream;
use tracing::debug;

pub struct ControlClient {
    socket: PathBuf,
}

impl ControlClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    async fn request(&self, method: Method, path: String) -> Result<String> {
        debug!(socket = %self.socket.display(), %path, "control request");
        let exchange = async {
            let stream = UnixStream::connect(&self.socket).await.map_err(|e| {
                Error::Transport(format!(
                    "cannot connect to {}: {}",
                    self.socket.display(),
                    e
                ))
            })?;
            let (mut sender, connection) = hyper::client::conn::handshake(stream)
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
            tokio::spawn(async move {
                let _ = connection.await;
            });

            let request = Request::builder()
                .method(method)
                .uri(&path)
                .header(hyper::header::HOST, "localhost")
                .body(Body::empty())
                .map_err(|e| Error::Transport(e.to_string()))?;
            let response = sender
                .send_request(request)
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
            if response.status() != StatusCode::OK {
                return Err(Error::InvalidResponse);
            }
            let bytes = hyper::body::to_bytes(response.into_body())
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
            let envelope: CmdResponse =
                serde_json::from_slice(&bytes).map_err(|_| Error::InvalidResponse)?;
            if envelope.success {
                Ok(envelope.msg)
            } else {
                Err(Error::Remote(envelope.msg))
            }
        };

        match tokio::time::timeout(control::CLIENT_TIMEOUT, exchange).await {
            Ok(result) => result,
            Err(_) => Err(Error::Transport(format!(
                "request to {} timed out",
                self.socket.display()
            ))),
        }
    }

    async fn check_operation(&self, op: &str, id: Option<&str>) -> Result<()> {
        let path = match id {
            Some(id) => format!("/{}/{}", op, id),
            None => format!("/{}_all", op),
        };
        self.request(Method::POST, path).await.map(|_| ())
    }

    async fn report(&self, what: &str, id: Option<&str>) -> Result<String> {
        let path = match id {
            Some(id) => format!("/{}/{}", what, id),
            None => format!("/{}", what),
        };
        self.request(Method::GET, path).await
    }

    fn collect(result: Result<()>) -> Vec<Error> {
        match result {
            Ok(()) => Vec::new(),
            Err(e) => vec![e],
        }
    }
}

#[async_trait]
impl ChecksManager for ControlClient {
    async fn monitor(&self, id: &str) -> Result<()> {
        self.check_operation("monitor", Some(id)).await
    }

    async fn unmonitor(&self, id: &str) -> Result<()> {
        self.check_operation("unmonitor", Some(id)).await
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.check_operation("start", Some(id)).await
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.check_operation("stop", Some(id)).await
    }

    async fn restart(&self, id: &str) -> Result<()> {
        self.check_operation("restart", Some(id)).await
    }

    async fn monitor_all(&self) -> Vec<Error> {
        Self::collect(self.check_operation("monitor", None).await)
    }

    async fn unmonitor_all(&self) -> Vec<Error> {
        Self::collect(self.check_operation("unmonitor", None).await)
    }

    async fn start_all(&self) -> Vec<Error> {
        Self::collect(self.check_operation("start", None).await)
    }

    async fn stop_all(&self) -> Vec<Error> {
        Self::collect(self.check_operation("stop", None).await)
    }

    async fn restart_all(&self) -> Vec<Error> {
        Self::collect(self.check_operation("restart", None).await)
    }

    async fn status_text(&self, id: Option<&str>) -> Result<String> {
        self.report("status", id).await
    }

    async fn summary_text(&self, id: Option<&str>) -> Result<String> {
        self.report("summary", id).await
    }
}
