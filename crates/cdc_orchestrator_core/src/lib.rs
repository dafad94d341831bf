//! Incremental change-data-capture orchestration primitives.
//!
//! This crate owns the watermark tracker state machine, partition windowing
//! and the collaborator contracts it depends on. It intentionally excludes
//! AWS SDK and Lambda runtime concerns, which live in
//! `cdc_orchestrator_lambda`.

pub mod config;
pub mod contract;
pub mod error;
#[cfg(any(test, feature = "test-helpers"))]
pub mod memory;
pub mod partition;
pub mod ports;
pub mod state;
pub mod tracker;
pub mod window;

pub use config::{FailurePolicy, TrackerConfig};
pub use contract::{JobInputDescriptor, JobRunStatus, Outcome, SkipReason};
pub use error::TrackerError;
pub use partition::Partition;
pub use state::TrackerState;
pub use tracker::{CdcTracker, Collaborators, Snapshot};
pub use window::Window;
