//! CPU time of a single process from `/proc/<pid>/stat`.
//!
//! The process table only reports usage once a process has accumulated some
//! CPU time, so a target sampled from birth would read 0 for its first
//! window. Reading the tick counters directly has no such gap.

use super::probe::ProbeError;

/// Clock ticks per second of the `/proc` time counters.
pub const USER_HZ: f64 = 100.0;

/// Combined user and system time of `pid`, in clock ticks. A zombie or dead
/// process is reported gone.
#[cfg(target_os = "linux")]
pub fn cpu_ticks(pid: u32) -> Result<u64, ProbeError> {
    use std::io::ErrorKind;

    let content = match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ProbeError::Gone(pid)),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => return Err(ProbeError::AccessDenied(pid)),
        Err(e) => return Err(e.into()),
    };

    match parse_stat(&content) {
        Some(('Z' | 'X', _)) | None => Err(ProbeError::Gone(pid)),
        Some((_, ticks)) => Ok(ticks),
    }
}

/// Percentage of one CPU used by `ticks` over `secs` of wall time.
pub fn percent(ticks: u64, secs: f64) -> f32 {
    if secs <= 0.0 {
        return 0.0;
    }
    (ticks as f64 / USER_HZ / secs * 100.0) as f32
}

/// State letter and `utime + stime` from one stat line.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_stat(content: &str) -> Option<(char, u64)> {
    // The command name may hold spaces and parens; fields resume after the last ')'.
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();

    // fields[0] is field 3 (state); utime and stime are fields 14 and 15.
    let state = fields.first()?.chars().next()?;
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some((state, utime + stime))
}
