//! Sandbox run controller.
//!
//! Phases: Launching -> Monitoring -> Draining -> Finalizing -> Complete, or
//! Aborted on launch failure or timeout. Aborted runs persist nothing.

pub mod aggregate;
pub mod controller;
pub mod error;

pub use aggregate::FrozenRun;
pub use controller::{RunPhase, RunRequest, SandboxCollector};
pub use error::CollectorError;
