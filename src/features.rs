use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::telemetry::RunRollup;

/// Behaviour classes the workload generator produces and the classifier
/// predicts. The discriminant is the class index used at training time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Benign = 0,
    Wiper = 1,
    Ransom = 2,
    Beacon = 3,
    Persist = 4,
}

impl Label {
    pub const ALL: [Label; 5] = [Label::Benign, Label::Wiper, Label::Ransom, Label::Beacon, Label::Persist];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Benign => "benign",
            Label::Wiper => "wiper",
            Label::Ransom => "ransom",
            Label::Beacon => "beacon",
            Label::Persist => "persist",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown label '{s}'"))
    }
}

/// Rollup columns fed to the classifier, in model order.
pub const FEATURE_NAMES: [&str; 13] = [
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

/// Classifier input derived from one rollup.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: [f64; 13],
}

impl FeatureVector {
    /// Same transform as training: raw counts, `ln(1 + x)` on the two skewed
    /// columns (`cpu_max`, `duration_s`).
    pub fn from_rollup(rollup: &RunRollup) -> Self {
        Self {
            values: [
                rollup.file_create as f64,
                rollup.file_delete as f64,
                rollup.file_modify as f64,
                rollup.folder_create as f64,
                rollup.folder_delete as f64,
                rollup.reg_set as f64,
                rollup.reg_delete as f64,
                rollup.dns_query as f64,
                rollup.net_connect as f64,
                rollup.proc_spawn as f64,
                rollup.cpu_max.ln_1p(),
                rollup.duration_s.ln_1p(),
                rollup.unique_exts as f64,
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES.iter().position(|n| *n == name).map(|i| self.values[i])
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_NAMES.len()))?;
        for (name, value) in FEATURE_NAMES.iter().zip(self.values.iter()) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
