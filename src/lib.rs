pub mod agents;
pub mod collector;
pub mod config;
pub mod dataset;
pub mod features;
pub mod record;
pub mod services;
pub mod store;
pub mod telemetry;
pub mod workload;

// Re-export the pieces a caller needs to perform a run
pub use collector::{CollectorError, RunRequest, SandboxCollector};
pub use config::CollectorConfig;
pub use record::{SampleRecord, TargetProcess};
