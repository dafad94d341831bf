//! AWS adapters, handlers and binaries for the incremental CDC orchestrator.
//!
//! The tracker state machine lives in `cdc_orchestrator_core`. This crate
//! binds its collaborator traits to S3 and Glue, resolves runtime settings
//! from flags and environment, and hosts the Lambda and CLI entry points.

pub mod adapters;
pub mod console;
pub mod handlers;
pub mod observability;
pub mod runtime;
pub mod settings;
