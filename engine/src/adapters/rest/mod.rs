//! Control plane served over the daemon's Unix socket
//! HTTP/1.1 with a JSON `{success, msg}` envelope on every route.

pub mod handlers;
pub mod router;
pub mod unix_socket;

pub use handlers::{AppState, CmdResponse};
pub use router::build_router;
pub use unix_socket::serve_on_unix_socket;
