use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::telemetry::{EventPayload, TimelineStore};

/// How long `stop` waits for the drain task once the watcher is gone.
const DRAIN_DEADLINE: Duration = Duration::from_secs(2);

/// Recursive watcher over the sandbox root.
///
/// OS notifications are forwarded through an unbounded channel to a drain
/// task that classifies them and appends to the timeline. Stopping drops the
/// watcher, which closes the channel; the drain task keeps reading until the
/// channel is empty, so nothing already delivered is lost.
pub struct FsMonitor {
    watcher: RecommendedWatcher,
    drain: JoinHandle<usize>,
    settle: Duration,
}

impl FsMonitor {
    pub fn start(root: &Path, timeline: TimelineStore, settle: Duration) -> notify::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = notify::recommended_watcher(move |res| {
            // Receiver only goes away after the watcher itself is dropped.
            let _ = tx.send(res);
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        info!("Watching {:?}", root);

        let drain = tokio::spawn(async move {
            let mut classifier = FsEventClassifier::default();
            let mut appended = 0;
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        for payload in classifier.classify(&event) {
                            timeline.append(payload);
                            appended += 1;
                        }
                    }
                    Err(e) => warn!("Watcher error: {}", e),
                }
            }
            appended
        });

        Ok(Self { watcher, drain, settle })
    }

    /// Stops watching and waits for every in-flight notification to land on
    /// the timeline. Returns how many events this monitor appended.
    pub async fn stop(self) -> usize {
        let FsMonitor { watcher, drain, settle } = self;

        tokio::time::sleep(settle).await;
        drop(watcher);

        finish_drain(drain, DRAIN_DEADLINE).await
    }
}

/// Awaits the drain task for at most `deadline`. A task still running after
/// that is aborted and awaited, so it appends nothing once this returns.
async fn finish_drain(mut drain: JoinHandle<usize>, deadline: Duration) -> usize {
    match tokio::time::timeout(deadline, &mut drain).await {
        Ok(Ok(appended)) => {
            debug!(appended, "Filesystem monitor stopped");
            appended
        }
        Ok(Err(e)) => {
            warn!("Filesystem drain task failed: {}", e);
            0
        }
        Err(_) => {
            warn!("Filesystem drain task did not finish within {:?}", deadline);
            drain.abort();
            let _ = drain.await;
            0
        }
    }
}

/// Turns raw notifications into timeline payloads.
///
/// A file write shows up as one or more data-modify notifications followed by
/// a close-after-write. The classifier reports one `file_modify` per write
/// session, and none for the session that created the file.
#[derive(Debug, Default)]
pub struct FsEventClassifier {
    /// Created and not yet closed after writing.
    fresh: HashSet<PathBuf>,
    /// Pre-existing files with a modify already reported for the open session.
    writing: HashSet<PathBuf>,
}

impl FsEventClassifier {
    pub fn classify(&mut self, event: &Event) -> Vec<EventPayload> {
        let mut out = Vec::new();

        for path in &event.paths {
            let shown = path.to_string_lossy().into_owned();

            match event.kind {
                EventKind::Create(CreateKind::Folder) => {
                    out.push(EventPayload::FolderCreate { path: shown });
                }
                EventKind::Create(CreateKind::File) => {
                    self.fresh.insert(path.clone());
                    out.push(EventPayload::FileCreate { path: shown });
                }
                EventKind::Create(_) => {
                    if path.is_dir() {
                        out.push(EventPayload::FolderCreate { path: shown });
                    } else {
                        self.fresh.insert(path.clone());
                        out.push(EventPayload::FileCreate { path: shown });
                    }
                }
                // A watched directory reports its own removal; the parent
                // reports the same removal as a folder delete.
                EventKind::Remove(RemoveKind::Other) => {}
                EventKind::Remove(kind) => {
                    self.fresh.remove(path);
                    self.writing.remove(path);
                    if kind == RemoveKind::Folder {
                        out.push(EventPayload::FolderDelete { path: shown });
                    } else {
                        out.push(EventPayload::FileDelete { path: shown });
                    }
                }
                EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                    if self.fresh.contains(path) || self.writing.contains(path) || path.is_dir() {
                        continue;
                    }
                    self.writing.insert(path.clone());
                    out.push(EventPayload::FileModify { path: shown });
                }
                EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                    self.fresh.remove(path);
                    self.writing.remove(path);
                }
                _ => {}
            }
        }

        out
    }
}
