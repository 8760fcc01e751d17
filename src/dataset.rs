use std::io::{self, Write};

use crate::record::SampleRecord;
use crate::telemetry::RunRollup;

pub const CSV_HEADER: [&str; 15] = [
    "sample_id",
    "label",
    "file_create",
    "file_delete",
    "file_modify",
    "folder_create",
    "folder_delete",
    "reg_set",
    "reg_delete",
    "dns_query",
    "net_connect",
    "proc_spawn",
    "cpu_max",
    "duration_s",
    "unique_exts",
];

/// One dataset row: identity plus the record's rollup.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub sample_id: String,
    pub label: String,
    pub rollup: RunRollup,
}

impl DatasetRow {
    pub fn from_record(record: &SampleRecord) -> Self {
        Self {
            sample_id: record.sample_id.to_string(),
            label: record.label.clone().unwrap_or_default(),
            rollup: record.rollup.clone(),
        }
    }

    fn fields(&self) -> [String; 15] {
        let r = &self.rollup;
        [
            escape(&self.sample_id),
            escape(&self.label),
            r.file_create.to_string(),
            r.file_delete.to_string(),
            r.file_modify.to_string(),
            r.folder_create.to_string(),
            r.folder_delete.to_string(),
            r.reg_set.to_string(),
            r.reg_delete.to_string(),
            r.dns_query.to_string(),
            r.net_connect.to_string(),
            r.proc_spawn.to_string(),
            r.cpu_max.to_string(),
            r.duration_s.to_string(),
            r.unique_exts.to_string(),
        ]
    }
}

/// Writes the header and one line per row.
pub fn write_csv<W: Write>(mut out: W, rows: &[DatasetRow]) -> io::Result<()> {
    writeln!(out, "{}", CSV_HEADER.join(","))?;
    for row in rows {
        writeln!(out, "{}", row.fields().join(","))?;
    }
    out.flush()
}

/// RFC 4180 quoting, only when the value needs it.
fn escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
