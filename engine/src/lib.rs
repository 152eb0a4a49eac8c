//! Warden supervision engine
//!
//! A library for keeping a declared set of services in their desired state:
//! - Declarative control-file parsing with atomic reload
//! - Periodic liveness checks against PID files, with bounded restarts
//! - Persistent monitored-state database
//! - HTTP/JSON control plane over a Unix domain socket
//!
//! ## Architecture
//!
//! The engine follows a ports-and-adapters layout:
//!
//! - **Domain**: check entities, the supervisor, the parser and its walkers
//! - **Infrastructure**: state store, PID-file and permission primitives
//! - **Adapters**: the control-plane server and the socket client
//!
//! ## Usage
//!
//! The daemon binary (`wardend`) wires these together:
//!
//! ```rust,ignore
//! use warden_engine::{
//!     adapters::rest::{build_router, serve_on_unix_socket},
//!     domain::{Supervisor, SupervisorConfig},
//! };
//! ```

pub mod adapters;
pub mod constants;
pub mod domain;
pub mod infrastructure;
