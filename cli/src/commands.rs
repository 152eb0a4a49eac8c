//! Command handlers
//! Each handler resolves paths, selects the manager and maps the outcome to
//! an exit code. Success lines go to stdout, failures to stderr.

use crate::{Cli, Command};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::time::Duration;
use warden_engine::adapters::ControlClient;
use warden_engine::constants::{control, env as env_vars};
use warden_engine::domain::{ChecksManager, Error, Supervisor, SupervisorConfig};
use warden_engine::infrastructure::process::{is_process_running, read_pid, wait_until};

pub async fn run(cli: Cli) -> i32 {
    tracing::debug!(foreground = cli.foreground, "dispatching command");
    match &cli.command {
        Command::Version => {
            println!("warden {}", env!("CARGO_PKG_VERSION"));
            0
        }
        Command::Reload => reload(&cli),
        Command::Quit => quit(&cli).await,
        Command::Status { id } => report(&cli, "status", id.as_deref()).await,
        Command::Summary { id } => report(&cli, "summary", id.as_deref()).await,
        Command::Start { target } => service_command(&cli, "start", target.as_deref()).await,
        Command::Stop { target } => service_command(&cli, "stop", target.as_deref()).await,
        Command::Restart { target } => service_command(&cli, "restart", target.as_deref()).await,
        Command::Monitor { target } => service_command(&cli, "monitor", target.as_deref()).await,
        Command::Unmonitor { target } => {
            service_command(&cli, "unmonitor", target.as_deref()).await
        }
    }
}

fn resolved(cli: &Cli) -> SupervisorConfig {
    let root = std::env::var(env_vars::DAEMON_CWD)
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")));
    let abs = |path: &std::path::Path| {
        warden_engine::infrastructure::fs::abs_from_root(path, &root)
    };
    SupervisorConfig {
        control_file: abs(&cli.controlfile),
        pid_file: abs(&cli.pidfile),
        state_file: abs(&cli.statefile),
        socket_file: Some(abs(&cli.socketfile)),
        log_file: cli.logfile.clone(),
        check_interval: cli.daemonize.map(Duration::from_secs),
    }
}

fn daemon_pid(config: &SupervisorConfig) -> Option<i32> {
    read_pid(&config.pid_file)
        .ok()
        .filter(|pid| is_process_running(*pid))
}

fn no_daemon_message(config: &SupervisorConfig) -> String {
    format!(
        "Cannot find any running daemon to contact. If it is running, \
         make sure you are pointing to the right pid file ({})",
        config.pid_file.display()
    )
}

/// Socket client when the daemon is alive, in-process supervisor otherwise.
fn manager(config: &SupervisorConfig) -> Result<Box<dyn ChecksManager>, Error> {
    if daemon_pid(config).is_some() {
        if let Some(socket) = &config.socket_file {
            return Ok(Box::new(ControlClient::new(socket)));
        }
    }
    Ok(Box::new(Supervisor::new(config.clone())?))
}

async fn service_command(cli: &Cli, cmd: &str, target: Option<&str>) -> i32 {
    let config = resolved(cli);
    let manager = match manager(&config) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("Error initializing application: {}", e);
            return 1;
        }
    };
    match execute(manager.as_ref(), cmd, target).await {
        Ok(msg) => {
            if !msg.is_empty() {
                println!("{}", msg);
            }
            0
        }
        Err(msg) => {
            eprintln!("{}", msg);
            1
        }
    }
}

async fn execute(
    manager: &dyn ChecksManager,
    cmd: &str,
    target: Option<&str>,
) -> Result<String, String> {
    let status = match cmd {
        "start" => "Started",
        "stop" => "Stopped",
        "restart" => "Restarted",
        "monitor" => "Monitored",
        "unmonitor" => "Unmonitored",
        other => return Err(format!("Unknown command {}", other)),
    };

    match target {
        None | Some("all") => {
            let errors = match cmd {
                "start" => manager.start_all().await,
                "stop" => manager.stop_all().await,
                "restart" => manager.restart_all().await,
                "monitor" => manager.monitor_all().await,
                _ => manager.unmonitor_all().await,
            };
            if errors.is_empty() {
                Ok(String::new())
            } else {
                let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                Err(msgs.join("\n"))
            }
        }
        Some(id) => {
            let result = match cmd {
                "start" => manager.start(id).await,
                "stop" => manager.stop(id).await,
                "restart" => manager.restart(id).await,
                "monitor" => manager.monitor(id).await,
                _ => manager.unmonitor(id).await,
            };
            match result {
                Ok(()) => Ok(format!("{} {}", status, id)),
                Err(e) => Err(format!("Failed to {} {}: {}", cmd, id, e)),
            }
        }
    }
}

async fn report(cli: &Cli, what: &str, id: Option<&str>) -> i32 {
    let config = resolved(cli);
    if daemon_pid(&config).is_none() {
        eprintln!("{}", no_daemon_message(&config));
        return 1;
    }
    let socket = match &config.socket_file {
        Some(socket) => socket.clone(),
        None => {
            eprintln!("The daemon seems to be running but it is not accessible through a socket.");
            return 1;
        }
    };
    let client = ControlClient::new(socket);
    let result = match what {
        "status" => client.status_text(id).await,
        _ => client.summary_text(id).await,
    };
    match result {
        Ok(text) if text.is_empty() => {
            eprintln!("Got empty {} text", what);
            1
        }
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error getting {}: {}", what, e);
            1
        }
    }
}

fn reload(cli: &Cli) -> i32 {
    let config = resolved(cli);
    match daemon_pid(&config) {
        Some(pid) => match kill(Pid::from_raw(pid), Signal::SIGHUP) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Failed to signal daemon with PID {}: {}", pid, e);
                1
            }
        },
        None => {
            eprintln!("{}", no_daemon_message(&config));
            1
        }
    }
}

/// SIGTERM the daemon; escalate to SIGKILL if it is still alive after the
/// grace period. The supervised processes are left running.
async fn quit(cli: &Cli) -> i32 {
    let config = resolved(cli);
    match daemon_pid(&config) {
        Some(pid) => {
            let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
            if !wait_until(|| !is_process_running(pid), control::QUIT_GRACE).await {
                let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
            }
            0
        }
        None => {
            eprintln!(
                "Cannot find any running daemon to stop. If it is running, \
                 make sure you are pointing to the right pid file ({})",
                config.pid_file.display()
            );
            1
        }
    }
}
