//! Control plane round trips: a real supervisor served on a real Unix
//! socket, driven through the client exactly as the CLI would.

mod common;

use common::{eventually, retry_while_busy, Sandbox};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use warden_engine::adapters::rest::{build_router, serve_on_unix_socket};
use warden_engine::adapters::ControlClient;
use warden_engine::domain::{ChecksManager, Error, Supervisor};
use warden_engine::infrastructure::StateDb;

struct Plane {
    supervisor: Arc<Supervisor>,
    client: ControlClient,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

async fn serve(sandbox: &Sandbox, control: &str) -> Plane {
    let config = sandbox.config(sandbox.write_control(control), true);
    let supervisor = Arc::new(Supervisor::new(config).unwrap());
    let shutdown = CancellationToken::new();

    let socket = sandbox.socket_file();
    let app = build_router(supervisor.clone());
    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            serve_on_unix_socket(&socket, app, shutdown).await.unwrap();
        })
    };
    assert!(
        eventually(|| sandbox.socket_file().exists(), Duration::from_secs(5)).await,
        "server should bind its socket"
    );

    Plane {
        supervisor,
        client: ControlClient::new(sandbox.socket_file()),
        shutdown,
        server,
    }
}

impl Plane {
    async fn teardown(self) {
        self.shutdown.cancel();
        let _ = self.server.await;
    }
}

#[tokio::test]
async fn stop_then_start_over_the_socket() {
    let sandbox = Sandbox::new();
    let control = format!(
        "{}{}",
        sandbox.service_block("apache"),
        sandbox.service_block("mysql")
    );
    let plane = serve(&sandbox, &control).await;

    plane.client.start("apache").await.unwrap();
    plane.client.start("mysql").await.unwrap();
    assert!(
        eventually(
            || sandbox.service_running("apache") && sandbox.service_running("mysql"),
            Duration::from_secs(10)
        )
        .await
    );

    // service operations over the socket do not block; observe the effect
    retry_while_busy(|| plane.client.stop("apache")).await.unwrap();
    assert!(eventually(|| !sandbox.service_running("apache"), Duration::from_secs(10)).await);
    assert!(sandbox.service_running("mysql"), "mysql must be unaffected");

    retry_while_busy(|| plane.client.start("apache")).await.unwrap();
    assert!(eventually(|| sandbox.service_running("apache"), Duration::from_secs(10)).await);

    plane.teardown().await;
    sandbox.reap();
}

#[tokio::test]
async fn monitor_flag_changes_are_persisted() {
    let sandbox = Sandbox::new();
    let control = sandbox.service_block("apache");
    let plane = serve(&sandbox, &control).await;

    plane.client.unmonitor("apache").await.unwrap();
    assert!(!plane.supervisor.find_check("apache").unwrap().is_monitored());
    let db = StateDb::open(sandbox.path().join("state")).unwrap();
    assert!(!db.entry("apache").unwrap().monitored);

    plane.client.monitor("apache").await.unwrap();
    assert!(plane.supervisor.find_check("apache").unwrap().is_monitored());
    let db = StateDb::open(sandbox.path().join("state")).unwrap();
    assert!(db.entry("apache").unwrap().monitored);

    plane.teardown().await;
    sandbox.reap();
}

#[tokio::test]
async fn client_and_supervisor_reports_agree() {
    let sandbox = Sandbox::new();
    let control = format!(
        "{}{}",
        sandbox.service_block("apache"),
        sandbox.service_block("mysql")
    );
    let plane = serve(&sandbox, &control).await;

    let over_socket = plane.client.summary_text(None).await.unwrap();
    let direct = plane.supervisor.summary_text(None).await.unwrap();
    // the uptime header may roll over a second between calls; the check
    // lines must match exactly
    let tail = |s: &str| s.lines().skip(1).map(String::from).collect::<Vec<_>>();
    assert_eq!(tail(&over_socket), tail(&direct));

    let status = plane.client.status_text(Some("mysql")).await.unwrap();
    assert!(status.contains("Process 'mysql'"));
    assert!(!status.contains("Process 'apache'"));

    plane.teardown().await;
    sandbox.reap();
}

#[tokio::test]
async fn wrong_ids_and_kinds_are_reported_through_the_envelope() {
    let sandbox = Sandbox::new();
    let control = format!("{}check host gateway\n", sandbox.service_block("apache"));
    let plane = serve(&sandbox, &control).await;

    match plane.client.start("gateway").await {
        Err(Error::Remote(msg)) => assert_eq!(msg, "Check gateway is not a process"),
        other => panic!("expected remote kind error, got {:?}", other),
    }
    match plane.client.stop("nothere").await {
        Err(Error::Remote(msg)) => assert_eq!(msg, "Cannot find check with id nothere"),
        other => panic!("expected remote lookup error, got {:?}", other),
    }

    // monitor applies to any check kind, including bare ones
    plane.client.unmonitor("gateway").await.unwrap();
    assert!(!plane.supervisor.find_check("gateway").unwrap().is_monitored());

    plane.teardown().await;
    sandbox.reap();
}

#[tokio::test]
async fn overlapping_bulk_operations_are_refused() {
    let sandbox = Sandbox::new();
    // a stop program that never kills anything keeps the guard slot busy
    // for the full stop timeout
    let slow_block = |id: &str| {
        format!(
            "check process {id} with pidfile {pid}\n  \
             start program = \"sleep 600 & echo $! > {pid}\" with timeout 5 seconds\n  \
             stop program = \"sleep 60\" with timeout 10 seconds\n",
            id = id,
            pid = sandbox.pid_file(id).display()
        )
    };
    let control = format!("{}{}", slow_block("apache"), slow_block("mysql"));
    let plane = serve(&sandbox, &control).await;

    plane.client.start("apache").await.unwrap();
    plane.client.start("mysql").await.unwrap();
    assert!(
        eventually(
            || sandbox.service_running("apache") && sandbox.service_running("mysql"),
            Duration::from_secs(10)
        )
        .await
    );

    // let the start futures drain so their guard slots are free again
    tokio::time::sleep(Duration::from_secs(1)).await;

    let stop_errors = plane.client.stop_all().await;
    assert!(stop_errors.is_empty(), "stop_all was refused: {:?}", stop_errors);
    let errors = plane.client.start_all().await;
    assert_eq!(errors.len(), 1);
    let msg = errors[0].to_string();
    assert!(
        msg.contains("[apache] Other action already in progress -- please try again later"),
        "unexpected message: {}",
        msg
    );
    assert!(
        msg.contains("[mysql] Other action already in progress -- please try again later"),
        "unexpected message: {}",
        msg
    );

    plane.teardown().await;
    sandbox.reap();
}
