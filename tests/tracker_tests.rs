#![cfg(target_os = "linux")]

use std::net::TcpListener;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use sunflower::agents::{ProcessProbe, SysinfoProbe};
use sunflower::telemetry::{EventKind, EventPayload};
use sunflower::{CollectorConfig, RunRequest, SandboxCollector};

const BUSY_LOOP: &str = "i=0; while [ $i -lt 2000000 ]; do i=$((i+1)); done";

fn collector(base: &Path) -> SandboxCollector {
    SandboxCollector::from_config(
        CollectorConfig::new(base.join("sandbox"), base.join("runs")).with_timeout(Duration::from_secs(30)),
    )
}

#[tokio::test]
async fn real_child_is_one_proc_spawn() {
    let base = tempfile::tempdir().unwrap();

    let record = collector(base.path())
        .run(RunRequest::new("benign", ["sh", "-c", "sleep 1.2 & wait"]))
        .await
        .unwrap();

    assert_eq!(record.rollup.proc_spawn, 1, "Child must be reported once: {:#?}", record.timeline);
    let spawn = record.timeline.iter().find(|e| e.kind() == EventKind::ProcSpawn).unwrap();
    match &spawn.payload {
        EventPayload::ProcSpawn { child_name, child_pid } => {
            assert_eq!(child_name, "sleep");
            assert!(*child_pid > 0);
        }
        other => panic!("Unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn open_connection_is_reported() {
    if !Path::new("/bin/bash").exists() {
        println!("bash not available, skipping");
        return;
    }
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let base = tempfile::tempdir().unwrap();

    let script = format!("exec 3<>/dev/tcp/127.0.0.1/{port}; sleep 1; exec 3>&-");
    let record = collector(base.path())
        .run(RunRequest::new("beacon", ["/bin/bash", "-c", script.as_str()]))
        .await
        .unwrap();

    let expected = format!("127.0.0.1:{port}");
    let remotes: Vec<_> = record
        .timeline
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::NetConnect { dst } => Some(dst.as_str()),
            _ => None,
        })
        .collect();
    assert!(record.rollup.net_connect >= 1, "No connection seen: {:#?}", record.timeline);
    assert!(remotes.iter().all(|dst| *dst == expected), "Unexpected remotes {:?}", remotes);

    drop(listener);
}

#[test]
fn first_window_after_launch_measures_cpu() {
    let mut child = Command::new("sh")
        .args(["-c", BUSY_LOOP])
        .stdout(Stdio::null())
        .spawn()
        .unwrap();

    let mut probe = SysinfoProbe::new(child.id());
    let cpu = probe.cpu_percent(Duration::from_millis(200));

    let _ = child.kill();
    let _ = child.wait();

    let cpu = cpu.expect("Busy target should still be alive after one window");
    assert!(cpu > 0.0, "First window read {}", cpu);
}

#[tokio::test]
async fn busy_target_reports_cpu() {
    let base = tempfile::tempdir().unwrap();

    let record = collector(base.path())
        .run(RunRequest::new("ransom", ["sh", "-c", BUSY_LOOP]))
        .await
        .unwrap();

    assert!(record.rollup.cpu_max > 0.0, "cpu_max stayed 0 over {}s", record.rollup.duration_s);
    println!("Busy target: cpu_max={} duration={}", record.rollup.cpu_max, record.rollup.duration_s);
}
