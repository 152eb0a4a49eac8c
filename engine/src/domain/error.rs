//! Engine errors
//! Configuration and state failures, operation outcomes and transport faults

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors: fatal at startup, refused at reload
    #[error("Control file '{}' does not exist", .0.display())]
    ControlFileMissing(PathBuf),

    #[error("Cannot parse check definition")]
    UnparsableCheck,

    #[error("Service name conflict, {0} already defined")]
    DuplicateCheck(String),

    #[error("Refusing to reload incorrect configuration")]
    ReloadRefused,

    #[error("file '{}' is not readable", .0.display())]
    NotReadable(PathBuf),

    #[error("file '{}' must be owned by you", .0.display())]
    NotOwner(PathBuf),

    #[error("file '{}' group must be yours", .0.display())]
    WrongGroup(PathBuf),

    #[error(
        "file '{}' must have permissions no more than {max:04o}; \
         right now permissions are {actual:04o}",
        .path.display()
    )]
    TooPermissive { path: PathBuf, max: u32, actual: u32 },

    #[error(
        "Requested opening '{}' in a too permissive mode {mode:04o} (max {max:04o})",
        .path.display()
    )]
    ModeTooOpen { path: PathBuf, mode: u32, max: u32 },

    // State errors: logged, never fatal at runtime
    #[error("Pid file '{}' does not exist", .0.display())]
    PidFileMissing(PathBuf),

    #[error("Error reading pid file '{}': {source}", .path.display())]
    PidFileUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed pid file '{}': first line must contain a positive integer", .0.display())]
    MalformedPidFile(PathBuf),

    #[error("Invalid pid file: '{}' is not a file", .0.display())]
    PidPathNotAFile(PathBuf),

    #[error("Invalid pid file: '{}' is not writable", .0.display())]
    PidPathNotWritable(PathBuf),

    #[error("Failed to serialize pid file '{}': {source}", .path.display())]
    PidFileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot serialize state database to an empty path")]
    EmptyStatePath,

    #[error("Malformed state database file: {0}")]
    MalformedDatabase(String),

    // Operation errors: surfaced to the caller
    #[error("Cannot find check with id {0}")]
    CheckNotFound(String),

    #[error("Check {0} is not a process")]
    NotAProcess(String),

    #[error("timed out waiting for {0} to be running")]
    StartTimedOut(String),

    #[error("timed out waiting for {0} to stop")]
    StopTimedOut(String),

    #[error("[{0}] Other action already in progress -- please try again later")]
    Busy(String),

    // Transport errors
    #[error("Error listening on socket {}: {detail}", .path.display())]
    Bind { path: PathBuf, detail: String },

    #[error("Got invalid response from server")]
    InvalidResponse,

    /// Failure message carried back in a `success=false` envelope.
    #[error("{0}")]
    Remote(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
