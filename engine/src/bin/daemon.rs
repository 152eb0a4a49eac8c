//! Warden daemon
//!
//! Long-running supervisor process: parses the control file, keeps the
//! declared services in their desired state and answers operator commands on
//! a Unix domain socket. Runs in the foreground; backgrounding is left to
//! the init system.
//!
//! Signals: SIGHUP reloads the control file, SIGTERM/SIGINT shut down
//! gracefully without touching the supervised processes.

use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use warden_engine::adapters::rest::{build_router, serve_on_unix_socket};
use warden_engine::constants::{env as env_vars, paths};
use warden_engine::domain::{Error, Supervisor, SupervisorConfig};
use warden_engine::infrastructure::fs::{abs_from_root, ensure_safe_permissions, file_exists};
use warden_engine::infrastructure::process::write_pid;

#[derive(Parser)]
#[command(name = "wardend", version, about = "Process supervision daemon")]
struct Args {
    /// Use this control file
    #[arg(short = 'c', long, value_name = "file", default_value = paths::CONTROL_FILE)]
    controlfile: PathBuf,

    /// Use this pidfile in daemon mode
    #[arg(short = 'p', long, value_name = "pidfile", default_value = paths::PID_FILE)]
    pidfile: PathBuf,

    /// Write state information to this file
    #[arg(short = 's', long, value_name = "file", default_value = paths::STATE_FILE)]
    statefile: PathBuf,

    /// Listen for requests on this socketfile
    #[arg(short = 'S', long, value_name = "socketfile", default_value = paths::SOCKET_FILE)]
    socketfile: PathBuf,

    /// Print log information to this file ('-' for stdout)
    #[arg(short = 'l', long, value_name = "file", default_value = paths::LOG_FILE)]
    logfile: String,

    /// Run checks once per n seconds
    #[arg(short = 'd', long, value_name = "n")]
    daemonize: Option<u64>,

    /// Do not run in background (needed for run from init)
    #[arg(short = 'I', long)]
    foreground: bool,

    /// Verbose mode, work noisy (diagnostic output)
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn fatal(msg: String) -> ! {
    eprintln!("{}", msg);
    std::process::exit(1);
}

fn init_logging(logfile: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    if logfile == "-" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
        return;
    }
    match std::fs::OpenOptions::new().create(true).append(true).open(logfile) {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Arc::new(file))
            .init(),
        Err(e) => fatal(format!("Cannot open log file '{}': {}", logfile, e)),
    }
}

fn build_config(args: &Args) -> SupervisorConfig {
    // A daemonization wrapper records the launch directory here so relative
    // paths keep meaning the same thing after the handoff.
    let root = std::env::var(env_vars::DAEMON_CWD)
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")));

    SupervisorConfig {
        control_file: abs_from_root(&args.controlfile, &root),
        pid_file: abs_from_root(&args.pidfile, &root),
        state_file: abs_from_root(&args.statefile, &root),
        socket_file: Some(abs_from_root(&args.socketfile, &root)),
        log_file: args.logfile.clone(),
        check_interval: Some(Duration::from_secs(args.daemonize.unwrap_or(120))),
    }
}

fn install_signal_handlers(supervisor: Arc<Supervisor>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut hangup = signal(SignalKind::hangup()).expect("Failed to install SIGHUP handler");
        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut interrupt =
            signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");
        loop {
            tokio::select! {
                _ = hangup.recv() => {
                    info!("SIGHUP received");
                    if let Err(e) = supervisor.reload() {
                        warn!(error = %e, "Reload failed");
                    }
                }
                _ = terminate.recv() => {
                    info!(signal = "SIGTERM", "Received shutdown signal");
                    shutdown.cancel();
                    break;
                }
                _ = interrupt.recv() => {
                    info!(signal = "SIGINT", "Received shutdown signal");
                    shutdown.cancel();
                    break;
                }
            }
        }
    });
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = build_config(&args);

    // Report unsafe setups before doing anything else; these are enforced
    // again when the files are opened.
    for file in [&config.control_file, &config.state_file] {
        if let Err(e) = ensure_safe_permissions(file) {
            fatal(e.to_string());
        }
    }
    if !file_exists(&config.control_file) {
        fatal(Error::ControlFileMissing(config.control_file.clone()).to_string());
    }

    init_logging(&args.logfile, args.verbose);
    info!(foreground = args.foreground, "Starting warden daemon");

    let pid_file = config.pid_file.clone();
    let supervisor = match Supervisor::new(config) {
        Ok(supervisor) => Arc::new(supervisor),
        Err(e) => fatal(format!("Error initializing application: {}", e)),
    };
    if let Err(e) = write_pid(&pid_file, supervisor.pid() as i32) {
        fatal(e.to_string());
    }

    let shutdown = CancellationToken::new();
    install_signal_handlers(supervisor.clone(), shutdown.clone());

    let server_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
    let server = supervisor.socket_file().map(|socket| {
        let app = build_router(supervisor.clone());
        let shutdown = shutdown.clone();
        let server_error = server_error.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_on_unix_socket(&socket, app, shutdown.clone()).await {
                error!(error = %e, "Control server failed");
                *server_error.lock().unwrap() = Some(e);
                shutdown.cancel();
            }
        })
    });
    if server.is_none() {
        warn!("No socket file configured, control server disabled");
    }

    supervisor.clone().run(shutdown.clone()).await;

    info!("Terminating application...");
    if let Some(handle) = server {
        let _ = handle.await;
    }
    let _ = std::fs::remove_file(&pid_file);
    info!("Terminated.");

    if server_error.lock().unwrap().is_some() {
        std::process::exit(1);
    }
}
