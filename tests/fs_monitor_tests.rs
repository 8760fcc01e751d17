use std::time::Duration;

use sunflower::agents::FsMonitor;
use sunflower::telemetry::{EventKind, TimelineStore};

const SETTLE: Duration = Duration::from_millis(300);

#[tokio::test]
async fn create_then_delete_both_reach_the_timeline() {
    let root = tempfile::tempdir().unwrap();
    let timeline = TimelineStore::new();
    let monitor = FsMonitor::start(root.path(), timeline.clone(), SETTLE).unwrap();

    let file = root.path().join("dropper.tmp");
    std::fs::write(&file, "payload").unwrap();
    std::fs::remove_file(&file).unwrap();

    let appended = monitor.stop().await;
    let events = timeline.snapshot();
    let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();

    assert_eq!(appended, events.len());
    assert!(kinds.contains(&EventKind::FileCreate), "Missing create in {:?}", kinds);
    assert!(kinds.contains(&EventKind::FileDelete), "Missing delete in {:?}", kinds);
    assert!(events.iter().all(|e| e.path().is_some_and(|p| p.ends_with("dropper.tmp"))));
}

#[tokio::test]
async fn rewriting_a_file_is_one_modify() {
    let root = tempfile::tempdir().unwrap();
    let file = root.path().join("config.ini");
    std::fs::write(&file, "a=1").unwrap();

    let timeline = TimelineStore::new();
    let monitor = FsMonitor::start(root.path(), timeline.clone(), SETTLE).unwrap();
    std::fs::write(&file, "a=2").unwrap();
    monitor.stop().await;

    let kinds: Vec<_> = timeline.snapshot().iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec![EventKind::FileModify]);
}

#[tokio::test]
async fn folders_are_reported_as_folders() {
    let root = tempfile::tempdir().unwrap();
    let timeline = TimelineStore::new();
    let monitor = FsMonitor::start(root.path(), timeline.clone(), SETTLE).unwrap();

    let dir = root.path().join("staging");
    std::fs::create_dir(&dir).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::remove_dir(&dir).unwrap();
    monitor.stop().await;

    let kinds: Vec<_> = timeline.snapshot().iter().map(|e| e.kind()).collect();
    assert!(kinds.contains(&EventKind::FolderCreate), "Got {:?}", kinds);
    assert!(kinds.contains(&EventKind::FolderDelete), "Got {:?}", kinds);
    assert!(!kinds.contains(&EventKind::FileCreate));
}
