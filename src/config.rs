use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_WATCH_SETTLE: Duration = Duration::from_millis(150);

/// Knobs for one collector instance. Shared by every run it performs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Directory tree the target works in and the watcher observes.
    pub sandbox_root: PathBuf,
    /// Where finished records are written, one file per sample id.
    pub runs_dir: PathBuf,
    /// Upper bound on target runtime before it is killed and the run aborted.
    pub run_timeout: Duration,
    /// Blocking window of each CPU sample; also the tracker's stop latency.
    pub sample_interval: Duration,
    /// Grace period between the stop signal and tearing the watcher down, so
    /// notifications already queued by the kernel are still read.
    pub watch_settle: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sandbox_root: PathBuf::from("sandbox"),
            runs_dir: PathBuf::from("data/runs"),
            run_timeout: DEFAULT_RUN_TIMEOUT,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            watch_settle: DEFAULT_WATCH_SETTLE,
        }
    }
}

impl CollectorConfig {
    pub fn new(sandbox_root: impl Into<PathBuf>, runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
            runs_dir: runs_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }
}
