//! Collaborator boundaries consumed by the tracker.
//!
//! Every collaborator is synchronous and decides its own error variant at the
//! boundary; callers never inspect error messages for control flow.

use crate::contract::JobRunStatus;

/// Precondition for a state blob write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePrecondition {
    /// Write only if the key does not exist yet.
    DoesNotExist,
    /// Write only if the stored version still matches.
    MatchesVersion(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedBlob {
    pub body: Vec<u8>,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("state object not found")]
    NotFound,
    #[error("state object changed since it was read")]
    PreconditionFailed,
    #[error("state store failure: {0}")]
    Other(String),
}

pub trait StateStore {
    fn read(&self, key: &str) -> Result<VersionedBlob, StoreError>;

    /// Fully overwrites `key` and returns the new version token.
    fn write(
        &self,
        key: &str,
        body: &[u8],
        precondition: WritePrecondition,
    ) -> Result<String, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub key: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    #[error("object listing failed: {0}")]
    Other(String),
}

pub type ObjectIter<'a> = Box<dyn Iterator<Item = Result<ObjectDescriptor, ListError>> + 'a>;

pub trait ObjectLister {
    /// Lists objects under `prefix` with keys strictly greater than
    /// `start_after_key`, in ascending key order. Pages are fetched lazily.
    fn list<'a>(&'a self, prefix: &str, start_after_key: &str) -> ObjectIter<'a>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobRunnerError {
    #[error("job concurrency limit exceeded: {0}")]
    ConcurrencyLimitExceeded(String),
    #[error("unknown job run status '{0}'")]
    UnknownStatus(String),
    #[error("job runner failure: {0}")]
    Other(String),
}

pub trait JobRunner {
    fn submit(&self, job_name: &str, input_descriptor_uri: &str) -> Result<String, JobRunnerError>;

    fn get_status(&self, job_name: &str, run_id: &str) -> Result<JobRunStatus, JobRunnerError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("descriptor write failed: {0}")]
    Other(String),
}

pub trait DescriptorSink {
    fn write_descriptor(&self, uri: &str, json_payload: &[u8]) -> Result<(), SinkError>;
}
