use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use super::event::{EventKind, TelemetryEvent};
use super::timeline::round_to;

/// Fixed-schema numeric summary of one run. Field order is the dataset
/// column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRollup {
    pub file_create: u64,
    pub file_delete: u64,
    pub file_modify: u64,
    pub folder_create: u64,
    pub folder_delete: u64,
    pub reg_set: u64,
    pub reg_delete: u64,
    pub dns_query: u64,
    pub net_connect: u64,
    pub proc_spawn: u64,
    pub cpu_max: f64,
    pub duration_s: f64,
    pub unique_exts: u64,
}

impl RunRollup {
    pub fn count(&self, kind: EventKind) -> u64 {
        match kind {
            EventKind::FileCreate => self.file_create,
            EventKind::FileDelete => self.file_delete,
            EventKind::FileModify => self.file_modify,
            EventKind::FolderCreate => self.folder_create,
            EventKind::FolderDelete => self.folder_delete,
            EventKind::RegSet => self.reg_set,
            EventKind::RegDelete => self.reg_delete,
            EventKind::DnsQuery => self.dns_query,
            EventKind::NetConnect => self.net_connect,
            EventKind::ProcSpawn => self.proc_spawn,
        }
    }

    fn count_mut(&mut self, kind: EventKind) -> &mut u64 {
        match kind {
            EventKind::FileCreate => &mut self.file_create,
            EventKind::FileDelete => &mut self.file_delete,
            EventKind::FileModify => &mut self.file_modify,
            EventKind::FolderCreate => &mut self.folder_create,
            EventKind::FolderDelete => &mut self.folder_delete,
            EventKind::RegSet => &mut self.reg_set,
            EventKind::RegDelete => &mut self.reg_delete,
            EventKind::DnsQuery => &mut self.dns_query,
            EventKind::NetConnect => &mut self.net_connect,
            EventKind::ProcSpawn => &mut self.proc_spawn,
        }
    }
}

/// Derives the rollup from a frozen timeline.
///
/// Every count comes from this single pass; no agent-side counter feeds into
/// it. Pure: the same events, `cpu_max` and `duration_s` always give the same
/// rollup.
pub fn compute_rollup(events: &[TelemetryEvent], cpu_max: f64, duration_s: f64) -> RunRollup {
    let mut rollup = RunRollup::default();
    let mut exts = BTreeSet::new();

    for event in events {
        *rollup.count_mut(event.kind()) += 1;

        if let Some(ext) = event.path().and_then(extension_of) {
            exts.insert(ext);
        }
    }

    rollup.unique_exts = exts.len() as u64;
    rollup.cpu_max = round_to(cpu_max.max(0.0), 2);
    rollup.duration_s = round_to(duration_s.max(0.0), 2);
    rollup
}

/// Lowercased extension of the last path component. Dots in parent
/// directories don't count, and neither does a leading dot on its own
/// (`.bashrc` has no extension).
fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::event::EventPayload;

    fn ev(t: f64, payload: EventPayload) -> TelemetryEvent {
        TelemetryEvent { t, payload }
    }

    #[test]
    fn extension_ignores_dotted_parent_dirs() {
        assert_eq!(extension_of("/tmp/.tmpA1b/benign_installer"), None);
        assert_eq!(extension_of("/tmp/.tmpA1b/doc_1.TXT"), Some("txt".to_string()));
        assert_eq!(extension_of("/sandbox/doc_1.txt.enc"), Some("enc".to_string()));
        assert_eq!(extension_of("/sandbox/Makefile"), None);
    }

    #[test]
    fn counts_every_kind_once() {
        let events = vec![
            ev(0.1, EventPayload::FileCreate { path: "/s/a.txt".into() }),
            ev(0.2, EventPayload::RegSet { detail: "k=v".into() }),
            ev(0.3, EventPayload::DnsQuery { domain: "x.example".into() }),
            ev(0.3, EventPayload::DnsQuery { domain: "y.example".into() }),
        ];
        let rollup = compute_rollup(&events, 12.345, 1.004);
        assert_eq!(rollup.file_create, 1);
        assert_eq!(rollup.reg_set, 1);
        assert_eq!(rollup.dns_query, 2);
        assert_eq!(rollup.cpu_max, 12.35);
        assert_eq!(rollup.duration_s, 1.0);
        assert_eq!(rollup.unique_exts, 1);
    }
}
