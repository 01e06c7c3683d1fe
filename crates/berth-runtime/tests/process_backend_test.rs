//! End-to-end runs on the host process backend: real `/bin/sh` services,
//! shared volume directories, env files and captured logs.

#![cfg(unix)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::path::Path;

use berth_common::config::{BackendKind, RuntimeConfig};
use berth_common::types::{ExitStatus, ServiceState};
use berth_runtime::Engine;

const DESCRIPTOR: &str = r#"
volumes:
  data:
services:
  seed:
    image: busybox
    command: echo seeded > "$BERTH_VOLUME_DATA/seed.txt"
    volumes:
      - data:/data
  greeter:
    image: busybox
    env_file: greeter.env
    environment:
      GREETING_TARGET: berth
    command: echo "$GREETING, $GREETING_TARGET from $BERTH_SERVICE"
  flaky:
    image: busybox
    restart: on-failure:1
    command: exit 3
"#;

fn open(dir: &Path) -> Engine {
    let path = dir.join("compose.yaml");
    std::fs::write(&path, DESCRIPTOR).expect("write descriptor");
    std::fs::write(dir.join("greeter.env"), "# greeting\nGREETING=hello\n").expect("write env");
    let config = RuntimeConfig {
        backend: BackendKind::Process,
        ..RuntimeConfig::default()
    };
    Engine::open(&path, Some("itest"), config).expect("open")
}

#[tokio::test]
async fn runs_descriptor_to_completion() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = open(dir.path());

    let report = engine.up(std::future::pending()).await.expect("up");

    let seed = report.service("seed").expect("seed");
    assert_eq!(seed.state, ServiceState::Exited);
    assert_eq!(seed.last_exit, Some(ExitStatus::code(0)));
    let seeded = dir.path().join(".berth/volumes/itest_data/seed.txt");
    assert_eq!(std::fs::read_to_string(seeded).expect("seed file"), "seeded\n");

    let greeting = engine.logs("greeter").expect("logs");
    assert!(greeting.contains("hello, berth from greeter"), "log: {greeting}");

    let flaky = report.service("flaky").expect("flaky");
    assert_eq!(flaky.restarts, 1);
    assert_eq!(flaky.last_exit, Some(ExitStatus::code(3)));
    let failed: Vec<_> = report.failed().map(|s| s.name.as_str()).collect();
    assert_eq!(failed, vec!["flaky"]);

    let snapshot = engine.status().expect("status").expect("snapshot");
    assert_eq!(snapshot.project, "itest");
    assert_eq!(snapshot.backend, "process");
    assert_eq!(snapshot.services.len(), 3);
    assert!(snapshot
        .services
        .iter()
        .all(|s| s.state == ServiceState::Exited));
}

#[tokio::test]
async fn down_removes_volumes_and_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = open(dir.path());
    let _ = engine.up(std::future::pending()).await.expect("up");

    let volume = dir.path().join(".berth/volumes/itest_data");
    assert!(volume.is_dir());

    engine.down(true).await.expect("down");
    assert!(!volume.exists());
    assert!(engine.status().expect("status").is_none());
    assert!(!engine.logs("seed").expect("logs are kept").is_empty());
}

#[tokio::test]
async fn shutdown_stops_a_long_running_service() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("compose.yaml");
    std::fs::write(
        &path,
        "services:\n  web:\n    image: busybox\n    restart: always\n    command: sleep 30\n",
    )
    .expect("write descriptor");
    let config = RuntimeConfig {
        backend: BackendKind::Process,
        ..RuntimeConfig::default()
    };
    let engine = Engine::open(&path, Some("itest"), config).expect("open");

    let shutdown = tokio::time::sleep(std::time::Duration::from_millis(300));
    let report = engine.up(shutdown).await.expect("up");

    let web = report.service("web").expect("web");
    assert_eq!(web.state, ServiceState::Stopped);
    assert_eq!(web.restarts, 0);
}
