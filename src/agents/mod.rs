//! The three observation agents that feed a run's timeline.

pub mod advisory;
pub mod fs_monitor;
pub mod probe;
pub mod procstat;
pub mod sockets;
pub mod tracker;

pub use advisory::{drain_advisories, parse_advisory};
pub use fs_monitor::{FsEventClassifier, FsMonitor};
pub use probe::{ChildProcess, ProbeError, ProcessProbe, SysinfoProbe};
pub use tracker::{ResourceTracker, TrackerReport};
