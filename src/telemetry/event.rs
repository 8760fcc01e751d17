use serde::{Deserialize, Serialize};
use std::fmt;

/// One observed occurrence on the timeline.
///
/// `t` is seconds since run start. The payload is flattened next to it so a
/// serialized event reads `{"t": 0.41, "kind": "file_create", "path": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub t: f64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl TelemetryEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn path(&self) -> Option<&str> {
        self.payload.path()
    }
}

/// Kind-specific fields. Each variant carries exactly the fields that are
/// meaningful for its kind and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    FileCreate { path: String },
    FileDelete { path: String },
    FileModify { path: String },
    FolderCreate { path: String },
    FolderDelete { path: String },
    RegSet { detail: String },
    RegDelete { detail: String },
    DnsQuery { domain: String },
    NetConnect { dst: String },
    ProcSpawn { child_name: String, child_pid: u32 },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::FileCreate { .. } => EventKind::FileCreate,
            EventPayload::FileDelete { .. } => EventKind::FileDelete,
            EventPayload::FileModify { .. } => EventKind::FileModify,
            EventPayload::FolderCreate { .. } => EventKind::FolderCreate,
            EventPayload::FolderDelete { .. } => EventKind::FolderDelete,
            EventPayload::RegSet { .. } => EventKind::RegSet,
            EventPayload::RegDelete { .. } => EventKind::RegDelete,
            EventPayload::DnsQuery { .. } => EventKind::DnsQuery,
            EventPayload::NetConnect { .. } => EventKind::NetConnect,
            EventPayload::ProcSpawn { .. } => EventKind::ProcSpawn,
        }
    }

    /// Filesystem path for file/folder events, `None` for everything else.
    pub fn path(&self) -> Option<&str> {
        match self {
            EventPayload::FileCreate { path }
            | EventPayload::FileDelete { path }
            | EventPayload::FileModify { path }
            | EventPayload::FolderCreate { path }
            | EventPayload::FolderDelete { path } => Some(path),
            _ => None,
        }
    }
}

/// Countable event kinds, in rollup column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FileCreate,
    FileDelete,
    FileModify,
    FolderCreate,
    FolderDelete,
    RegSet,
    RegDelete,
    DnsQuery,
    NetConnect,
    ProcSpawn,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::FileCreate,
        EventKind::FileDelete,
        EventKind::FileModify,
        EventKind::FolderCreate,
        EventKind::FolderDelete,
        EventKind::RegSet,
        EventKind::RegDelete,
        EventKind::DnsQuery,
        EventKind::NetConnect,
        EventKind::ProcSpawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FileCreate => "file_create",
            EventKind::FileDelete => "file_delete",
            EventKind::FileModify => "file_modify",
            EventKind::FolderCreate => "folder_create",
            EventKind::FolderDelete => "folder_delete",
            EventKind::RegSet => "reg_set",
            EventKind::RegDelete => "reg_delete",
            EventKind::DnsQuery => "dns_query",
            EventKind::NetConnect => "net_connect",
            EventKind::ProcSpawn => "proc_spawn",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_flat_with_only_its_own_fields() {
        let event = TelemetryEvent {
            t: 1.5,
            payload: EventPayload::ProcSpawn { child_name: "sh".into(), child_pid: 42 },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"t": 1.5, "kind": "proc_spawn", "child_name": "sh", "child_pid": 42})
        );
    }

    #[test]
    fn kind_names_match_serde_tags() {
        for kind in EventKind::ALL {
            let tag = serde_json::to_value(kind).unwrap();
            assert_eq!(tag, serde_json::Value::String(kind.as_str().to_string()));
        }
    }

    #[test]
    fn dns_event_reads_back_without_a_path() {
        let parsed: TelemetryEvent =
            serde_json::from_str(r#"{"t":0.2,"kind":"dns_query","domain":"example.com"}"#).unwrap();
        assert_eq!(parsed.kind(), EventKind::DnsQuery);
        assert_eq!(parsed.path(), None);
    }
}
