//! Infrastructure layer
//! Concrete collaborators the domain consults: the persistent state store,
//! PID-file and liveness primitives, and permission-enforcing file access.

pub mod fs;
pub mod process;
pub mod state_db;

pub use state_db::{StateDb, StateEntry, Value};
