//! Run telemetry: the shared timeline and the rollup derived from it.
//!
//! Agents only ever append to the [`TimelineStore`]. Counting happens once,
//! in [`compute_rollup`], after the timeline is frozen.

pub mod event;
pub mod rollup;
pub mod timeline;

pub use event::{EventKind, EventPayload, TelemetryEvent};
pub use rollup::{compute_rollup, RunRollup};
pub use timeline::TimelineStore;
