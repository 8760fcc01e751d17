use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use sysinfo::{Pid, System};
use thiserror::Error;

use super::{procstat, sockets};

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("process {0} is gone")]
    Gone(u32),

    #[error("access to process {0} denied")]
    AccessDenied(u32),

    #[error("probe I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A direct child of the target as seen by one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildProcess {
    pub name: String,
    pub pid: u32,
}

/// Read-only view of one live process, sampled by the resource tracker.
pub trait ProcessProbe {
    /// CPU percentage over a window of `interval`. Blocks for that long.
    fn cpu_percent(&mut self, interval: Duration) -> Result<f32, ProbeError>;

    /// Direct children only.
    fn children(&mut self) -> Result<Vec<ChildProcess>, ProbeError>;

    /// Remote endpoints of established connections.
    fn connections(&mut self) -> Result<Vec<SocketAddr>, ProbeError>;
}

/// [`ProcessProbe`] over the host process table.
pub struct SysinfoProbe {
    system: System,
    pid: Pid,
}

impl SysinfoProbe {
    pub fn new(pid: u32) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(pid),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn refresh_target(&mut self) -> Result<(), ProbeError> {
        if !self.system.refresh_process(self.pid) {
            return Err(ProbeError::Gone(self.pid.as_u32()));
        }
        match self.system.process(self.pid) {
            Some(process) if process.status() != sysinfo::ProcessStatus::Zombie => Ok(()),
            _ => Err(ProbeError::Gone(self.pid.as_u32())),
        }
    }
}

impl ProcessProbe for SysinfoProbe {
    /// Tick delta from procfs, so the window right after launch counts too.
    #[cfg(target_os = "linux")]
    fn cpu_percent(&mut self, interval: Duration) -> Result<f32, ProbeError> {
        let pid = self.pid.as_u32();
        let before = procstat::cpu_ticks(pid)?;
        let started = std::time::Instant::now();
        std::thread::sleep(interval);
        let after = procstat::cpu_ticks(pid)?;

        Ok(procstat::percent(after.saturating_sub(before), started.elapsed().as_secs_f64()))
    }

    #[cfg(not(target_os = "linux"))]
    fn cpu_percent(&mut self, interval: Duration) -> Result<f32, ProbeError> {
        // Usage is a delta between two refreshes.
        self.refresh_target()?;
        std::thread::sleep(interval);
        self.refresh_target()?;

        self.system
            .process(self.pid)
            .map(|process| process.cpu_usage())
            .ok_or(ProbeError::Gone(self.pid.as_u32()))
    }

    fn children(&mut self) -> Result<Vec<ChildProcess>, ProbeError> {
        self.system.refresh_processes();
        let threads = own_threads(self.pid.as_u32());

        let mut children: Vec<ChildProcess> = self
            .system
            .processes()
            .values()
            .filter(|process| process.parent() == Some(self.pid))
            .filter(|process| !threads.contains(&process.pid().as_u32()))
            .map(|process| ChildProcess {
                name: process.name().to_string(),
                pid: process.pid().as_u32(),
            })
            .collect();
        children.sort_by_key(|child| child.pid);
        Ok(children)
    }

    fn connections(&mut self) -> Result<Vec<SocketAddr>, ProbeError> {
        sockets::established_remotes(self.pid.as_u32())
    }
}

/// Thread ids of `pid`. The process table lists a multi-threaded target's
/// threads with the target as parent; they are not children.
#[cfg(target_os = "linux")]
fn own_threads(pid: u32) -> HashSet<u32> {
    let Ok(entries) = std::fs::read_dir(format!("/proc/{pid}/task")) else {
        return HashSet::new();
    };
    entries
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn own_threads(_pid: u32) -> HashSet<u32> {
    HashSet::new()
}
