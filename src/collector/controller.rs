use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::aggregate::FrozenRun;
use super::error::CollectorError;
use crate::agents::{drain_advisories, FsMonitor, ResourceTracker, SysinfoProbe, TrackerReport};
use crate::config::CollectorConfig;
use crate::record::{SampleRecord, TargetProcess};
use crate::store::{FileRecordStore, RecordStore};
use crate::telemetry::TimelineStore;

/// How long output pipes may stay open once the target has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// One invocation: who the target is and what ground-truth label to attach.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub label: Option<String>,
    pub command: Vec<String>,
}

impl RunRequest {
    pub fn new(label: impl Into<String>, command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            label: Some(label.into()),
            command: command.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Launching,
    Monitoring,
    Draining,
    Finalizing,
    Complete,
    Aborted,
}

impl RunPhase {
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Launching, Monitoring)
                | (Launching, Aborted)
                | (Monitoring, Draining)
                | (Monitoring, Aborted)
                | (Draining, Finalizing)
                | (Draining, Aborted)
                | (Finalizing, Complete)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Complete | RunPhase::Aborted)
    }
}

/// Lifecycle bookkeeping for a single run.
struct RunState {
    sample_id: Uuid,
    phase: RunPhase,
}

impl RunState {
    fn new() -> Self {
        let sample_id = Uuid::new_v4();
        info!(%sample_id, "Run Launching");
        Self { sample_id, phase: RunPhase::Launching }
    }

    fn advance(&mut self, next: RunPhase) {
        debug_assert!(self.phase.can_advance_to(next), "{:?} -> {:?}", self.phase, next);
        info!(sample_id = %self.sample_id, from = ?self.phase, to = ?next, "Run phase");
        self.phase = next;
    }
}

/// Launches a target inside the sandbox, observes it with the three agents
/// and turns the result into a persisted [`SampleRecord`].
pub struct SandboxCollector<S = FileRecordStore> {
    config: CollectorConfig,
    store: S,
}

impl SandboxCollector<FileRecordStore> {
    /// Collector persisting into `config.runs_dir`.
    pub fn from_config(config: CollectorConfig) -> Self {
        let store = FileRecordStore::new(config.runs_dir.clone());
        Self::new(config, store)
    }
}

impl<S: RecordStore> SandboxCollector<S> {
    pub fn new(config: CollectorConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Performs one run. Every path out of here, success or abort, has
    /// already joined the watcher and the tracker.
    pub async fn run(&self, request: RunRequest) -> Result<SampleRecord, CollectorError> {
        let (program, args) = request.command.split_first().ok_or(CollectorError::EmptyCommand)?;
        let mut run = RunState::new();
        let root = &self.config.sandbox_root;

        // === LAUNCHING ===
        // The watcher goes up before the target so its first writes are seen.
        if let Err(e) = std::fs::create_dir_all(root) {
            run.advance(RunPhase::Aborted);
            return Err(e.into());
        }
        let timeline = TimelineStore::new();
        let fs_monitor = match FsMonitor::start(root, timeline.clone(), self.config.watch_settle) {
            Ok(monitor) => monitor,
            Err(e) => {
                run.advance(RunPhase::Aborted);
                return Err(e.into());
            }
        };

        let spawned = Command::new(program)
            .args(args)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                warn!("Failed to launch {}: {}", program, source);
                fs_monitor.stop().await;
                run.advance(RunPhase::Aborted);
                return Err(CollectorError::Launch { program: program.clone(), source });
            }
        };
        // Only `None` once the child has been reaped, which can't have happened yet.
        let pid = child.id().unwrap_or_default();
        let target_process = TargetProcess::snapshot(pid, program);
        info!(sample_id = %run.sample_id, pid, "Target launched: {:?}", request.command);

        // === MONITORING ===
        run.advance(RunPhase::Monitoring);
        let stop = CancellationToken::new();
        let tracker = ResourceTracker::new(
            SysinfoProbe::new(pid),
            timeline.clone(),
            stop.clone(),
            self.config.sample_interval,
        )
        .spawn();
        let drains = [
            tokio::spawn(drain_optional(child.stdout.take(), timeline.clone())),
            tokio::spawn(drain_optional(child.stderr.take(), timeline.clone())),
        ];

        // === DRAINING ===
        // Only the target itself is bounded by the run timeout. Its output
        // may outlive it in a background grandchild.
        run.advance(RunPhase::Draining);
        let waited = tokio::time::timeout(self.config.run_timeout, child.wait()).await;

        match waited {
            Ok(Ok(status)) => {
                info!(sample_id = %run.sample_id, "Target exited: {}", status);
            }
            Ok(Err(e)) => {
                warn!(sample_id = %run.sample_id, "Waiting on target failed: {}", e);
            }
            Err(_) => {
                warn!(
                    sample_id = %run.sample_id,
                    "Target exceeded {:?}, terminating", self.config.run_timeout
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill target {}: {}", pid, e);
                }
                join_drains(drains).await;
                stop.cancel();
                fs_monitor.stop().await;
                join_tracker(tracker).await;
                run.advance(RunPhase::Aborted);
                return Err(CollectorError::TimeoutExceeded(self.config.run_timeout));
            }
        }
        let advisories = join_drains(drains).await;
        debug!(sample_id = %run.sample_id, advisories, "Output drained");

        // === FINALIZING ===
        run.advance(RunPhase::Finalizing);
        stop.cancel();
        let fs_events = fs_monitor.stop().await;
        let report = join_tracker(tracker).await;
        let duration_s = timeline.elapsed_secs();
        debug!(fs_events, total = timeline.len(), "Timeline frozen");

        // === COMPLETE ===
        let frozen = FrozenRun {
            sample_id: run.sample_id,
            label: request.label.clone(),
            target_process,
            timeline: timeline.snapshot(),
            cpu_max: report.cpu_max,
            duration_s,
        };
        let record = frozen.aggregate();
        let location = self.store.persist(&record)?;
        run.advance(RunPhase::Complete);
        info!(sample_id = %run.sample_id, "Saved record to {:?}", location);

        Ok(record)
    }
}

async fn drain_optional<R>(reader: Option<R>, timeline: TimelineStore) -> usize
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(reader) => drain_advisories(reader, &timeline).await,
        None => 0,
    }
}

/// Waits for both output drains, sharing one [`DRAIN_GRACE`] window. A drain
/// still running after that is aborted and awaited, so it can no longer
/// append once this returns.
async fn join_drains(drains: [JoinHandle<usize>; 2]) -> usize {
    let deadline = Instant::now() + DRAIN_GRACE;
    let mut recorded = 0;

    for mut drain in drains {
        match tokio::time::timeout_at(deadline, &mut drain).await {
            Ok(Ok(n)) => recorded += n,
            Ok(Err(e)) => warn!("Output drain task failed: {}", e),
            Err(_) => {
                debug!("Target output still open after exit, abandoning it");
                drain.abort();
                let _ = drain.await;
            }
        }
    }
    recorded
}

async fn join_tracker(tracker: JoinHandle<TrackerReport>) -> TrackerReport {
    match tracker.await {
        Ok(report) => report,
        Err(e) => {
            warn!("Resource tracker task failed: {}", e);
            TrackerReport::default()
        }
    }
}
