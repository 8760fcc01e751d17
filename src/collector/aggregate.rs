use uuid::Uuid;

use crate::record::{SampleRecord, TargetProcess};
use crate::telemetry::{compute_rollup, TelemetryEvent};

/// Everything a run leaves behind once both agents have been joined.
#[derive(Debug, Clone)]
pub struct FrozenRun {
    pub sample_id: Uuid,
    pub label: Option<String>,
    pub target_process: TargetProcess,
    pub timeline: Vec<TelemetryEvent>,
    pub cpu_max: f64,
    pub duration_s: f64,
}

impl FrozenRun {
    /// Builds the final record. No observation happens here, so calling it
    /// twice on the same run yields identical records.
    pub fn aggregate(&self) -> SampleRecord {
        SampleRecord {
            sample_id: self.sample_id,
            label: self.label.clone(),
            target_process: self.target_process.clone(),
            timeline: self.timeline.clone(),
            rollup: compute_rollup(&self.timeline, self.cpu_max, self.duration_s),
        }
    }
}
