use std::collections::HashSet;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::probe::{ProbeError, ProcessProbe};
use crate::telemetry::{EventPayload, TimelineStore};

/// What the tracker hands back once its loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackerReport {
    /// Highest CPU percentage sampled; 0.0 if no sample completed.
    pub cpu_max: f64,
    pub samples: u64,
}

/// Periodic CPU/child/connection sampler for the target process.
///
/// Runs until `stop` is cancelled or the probe loses sight of the target.
/// Losing the target is not an error for the run: the loop simply ends and
/// keeps whatever it had accumulated.
pub struct ResourceTracker<P> {
    probe: P,
    timeline: TimelineStore,
    stop: CancellationToken,
    interval: Duration,
    seen_children: HashSet<u32>,
    report: TrackerReport,
}

impl<P: ProcessProbe> ResourceTracker<P> {
    pub fn new(probe: P, timeline: TimelineStore, stop: CancellationToken, interval: Duration) -> Self {
        Self {
            probe,
            timeline,
            stop,
            interval,
            seen_children: HashSet::new(),
            report: TrackerReport::default(),
        }
    }

    /// Blocking sampling loop. Call from a dedicated thread.
    pub fn run(mut self) -> TrackerReport {
        while !self.stop.is_cancelled() {
            if let Err(e) = self.sample_once() {
                debug!("Resource tracker lost the target: {}", e);
                break;
            }
        }
        info!(cpu_max = self.report.cpu_max, samples = self.report.samples, "Resource tracker stopped");
        self.report
    }

    fn sample_once(&mut self) -> Result<(), ProbeError> {
        let cpu = self.probe.cpu_percent(self.interval)?;
        self.report.cpu_max = self.report.cpu_max.max(f64::from(cpu));
        self.report.samples += 1;

        for child in self.probe.children()? {
            if self.seen_children.insert(child.pid) {
                self.timeline.append(EventPayload::ProcSpawn {
                    child_name: child.name,
                    child_pid: child.pid,
                });
            }
        }

        // Still-open connections are reported again on every sample.
        for remote in self.probe.connections()? {
            self.timeline.append(EventPayload::NetConnect { dst: remote.to_string() });
        }

        Ok(())
    }
}

impl<P: ProcessProbe + Send + 'static> ResourceTracker<P> {
    /// Moves the loop onto the blocking pool.
    pub fn spawn(self) -> JoinHandle<TrackerReport> {
        tokio::task::spawn_blocking(move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::probe::ChildProcess;
    use std::collections::VecDeque;
    use std::net::SocketAddr;

    /// Scripted probe: each CPU reading consumes one entry; when the script
    /// runs out the process is reported gone.
    struct ScriptedProbe {
        cpu: VecDeque<f32>,
        children: Vec<ChildProcess>,
        remotes: Vec<SocketAddr>,
    }

    impl ProcessProbe for ScriptedProbe {
        fn cpu_percent(&mut self, _interval: Duration) -> Result<f32, ProbeError> {
            self.cpu.pop_front().ok_or(ProbeError::Gone(7))
        }

        fn children(&mut self) -> Result<Vec<ChildProcess>, ProbeError> {
            Ok(self.children.clone())
        }

        fn connections(&mut self) -> Result<Vec<SocketAddr>, ProbeError> {
            Ok(self.remotes.clone())
        }
    }

    #[test]
    fn children_reported_once_connections_every_sample() {
        let probe = ScriptedProbe {
            cpu: VecDeque::from(vec![3.0, 41.5, 12.0]),
            children: vec![ChildProcess { name: "curl".into(), pid: 900 }],
            remotes: vec!["93.184.216.34:443".parse().unwrap()],
        };
        let timeline = TimelineStore::new();
        let tracker = ResourceTracker::new(probe, timeline.clone(), CancellationToken::new(), Duration::ZERO);

        let report = tracker.run();

        assert_eq!(report.samples, 3);
        assert_eq!(report.cpu_max, 41.5);
        let events = timeline.snapshot();
        let spawns = events.iter().filter(|e| e.kind().as_str() == "proc_spawn").count();
        let connects = events.iter().filter(|e| e.kind().as_str() == "net_connect").count();
        assert_eq!(spawns, 1, "Already-seen child must not be re-emitted");
        assert_eq!(connects, 3, "Open connection is re-emitted per sample");
    }

    #[test]
    fn gone_target_keeps_zero_cpu_max() {
        let probe = ScriptedProbe { cpu: VecDeque::new(), children: vec![], remotes: vec![] };
        let timeline = TimelineStore::new();
        let report = ResourceTracker::new(probe, timeline.clone(), CancellationToken::new(), Duration::ZERO).run();

        assert_eq!(report, TrackerReport::default());
        assert!(timeline.is_empty());
    }

    #[test]
    fn cancelled_before_start_takes_no_sample() {
        let probe = ScriptedProbe { cpu: VecDeque::from(vec![50.0]), children: vec![], remotes: vec![] };
        let stop = CancellationToken::new();
        stop.cancel();
        let report = ResourceTracker::new(probe, TimelineStore::new(), stop, Duration::ZERO).run();
        assert_eq!(report.samples, 0);
    }
}
