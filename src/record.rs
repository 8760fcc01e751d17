use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};
use uuid::Uuid;

use crate::telemetry::{RunRollup, TelemetryEvent};

/// The persisted result of one completed run. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub sample_id: Uuid,
    pub label: Option<String>,
    pub target_process: TargetProcess,
    pub timeline: Vec<TelemetryEvent>,
    pub rollup: RunRollup,
}

/// Best-effort identity of the target process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProcess {
    pub name: String,
    pub pid: u32,
    pub exe: String,
    pub ppid: Option<u32>,
    pub signed: bool,
}

impl TargetProcess {
    /// What is known without asking the OS.
    pub fn fallback(pid: u32, program: &str) -> Self {
        Self {
            name: program.to_string(),
            pid,
            exe: String::new(),
            ppid: None,
            signed: false,
        }
    }

    /// Reads name, executable and parent from the process table. Any field
    /// that can't be read (process already gone, permissions) keeps its
    /// fallback value; this never fails.
    pub fn snapshot(pid: u32, program: &str) -> Self {
        let mut snapshot = Self::fallback(pid, program);

        let mut system = System::new();
        let sys_pid = Pid::from_u32(pid);
        if !system.refresh_process(sys_pid) {
            return snapshot;
        }

        if let Some(process) = system.process(sys_pid) {
            if !process.name().is_empty() {
                snapshot.name = process.name().to_string();
            }
            if let Some(exe) = process.exe() {
                snapshot.exe = exe.to_string_lossy().into_owned();
            }
            snapshot.ppid = process.parent().map(|p| p.as_u32());
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_of_missing_process_is_fallback() {
        // Pid far above any default pid_max.
        let snap = TargetProcess::snapshot(u32::MAX - 1, "python");
        assert_eq!(snap, TargetProcess::fallback(u32::MAX - 1, "python"));
    }

    #[test]
    fn snapshot_of_self_fills_parent() {
        let snap = TargetProcess::snapshot(std::process::id(), "tests");
        assert_eq!(snap.pid, std::process::id());
        assert!(snap.ppid.is_some());
        assert!(!snap.signed);
    }
}
