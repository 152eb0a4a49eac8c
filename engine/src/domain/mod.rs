pub mod entities;
pub mod error;
pub mod ports;
pub mod services;
pub mod value_objects;

pub use entities::{Check, ProcessCheck, Program, ServiceCheck};
pub use error::{Error, Result};
pub use ports::{ChecksManager, ConfigWalker};
pub use services::{ConfigParser, ExecGuard, Loader, ProcessOp, Supervisor, SupervisorConfig, Validator};
