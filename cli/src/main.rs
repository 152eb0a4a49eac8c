//! Operator CLI for the warden daemon
//!
//! Thin shell around the engine: parses flags, picks a checks manager (the
//! socket client when a daemon is alive, an in-process supervisor otherwise)
//! and maps outcomes to exit codes: 0 success, 1 operational failure,
//! 2 argument misuse, -1 unexpected error.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use warden_engine::constants::paths;

#[derive(Parser)]
#[command(name = "warden", version, about = "Service supervision utility")]
pub struct Cli {
    /// Use this control file
    #[arg(short = 'c', long, value_name = "file", default_value = paths::CONTROL_FILE, global = true)]
    pub controlfile: PathBuf,

    /// Use this pidfile to locate the daemon
    #[arg(short = 'p', long, value_name = "pidfile", default_value = paths::PID_FILE, global = true)]
    pub pidfile: PathBuf,

    /// File the daemon writes state information to
    #[arg(short = 's', long, value_name = "file", default_value = paths::STATE_FILE, global = true)]
    pub statefile: PathBuf,

    /// Socketfile the daemon listens on
    #[arg(short = 'S', long, value_name = "socketfile", default_value = paths::SOCKET_FILE, global = true)]
    pub socketfile: PathBuf,

    /// Print log information to this file
    #[arg(short = 'l', long, value_name = "file", default_value = paths::LOG_FILE, global = true)]
    pub logfile: String,

    /// Run checks once per n seconds (direct mode)
    #[arg(short = 'd', long, value_name = "n", global = true)]
    pub daemonize: Option<u64>,

    /// Do not run in background (needed for run from init)
    #[arg(short = 'I', long, global = true)]
    pub foreground: bool,

    /// Verbose mode, work noisy (diagnostic output)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start a service by name or all of them
    Start { target: Option<String> },
    /// Stop a service by name or all of them
    Stop { target: Option<String> },
    /// Restart a service by name or all of them
    Restart { target: Option<String> },
    /// Put a service back under supervision
    Monitor { target: Option<String> },
    /// Pause supervision of a service
    Unmonitor { target: Option<String> },
    /// Print full status information for each service
    Status { id: Option<String> },
    /// Print short status information for each service
    Summary { id: Option<String> },
    /// Make a running daemon re-read its control file
    Reload,
    /// Terminate the execution of a running daemon
    Quit,
    /// Print the version number of warden
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
    let code = commands::run(cli).await;
    std::process::exit(code);
}
