use crate::config::ConfigError;
use crate::partition::InvalidPartition;
use crate::ports::{JobRunnerError, ListError, SinkError, StoreError};

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Fatal tracker failures. A job submission rejected for concurrency is not
/// an error; it is reported as a skipped outcome.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The stored tracker changed after it was read; re-read and decide again.
    ///
    /// `orphaned_run_id` is set when a job run was already started before the
    /// losing write, so that run is not recorded in the tracker.
    #[error("tracker state at '{key}' was modified concurrently")]
    StaleState {
        key: String,
        orphaned_run_id: Option<String>,
    },

    #[error("tracker state is inconsistent: {0}")]
    InconsistentState(String),

    #[error("tracker state at '{key}' is not valid JSON")]
    CorruptState {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize tracker state for '{key}'")]
    StateEncoding {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    StateStore(StoreError),

    #[error(transparent)]
    Listing(#[from] ListError),

    #[error(transparent)]
    Descriptor(#[from] SinkError),

    #[error("failed to serialize job input descriptor")]
    DescriptorEncoding(#[source] serde_json::Error),

    #[error(transparent)]
    JobRunner(JobRunnerError),

    #[error(transparent)]
    InvalidPartition(#[from] InvalidPartition),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TrackerError {
    pub fn is_stale_state(&self) -> bool {
        matches!(self, Self::StaleState { .. })
    }

    /// Run started by the failed step but not recorded in the tracker.
    pub fn orphaned_run_id(&self) -> Option<&str> {
        match self {
            Self::StaleState {
                orphaned_run_id, ..
            } => orphaned_run_id.as_deref(),
            _ => None,
        }
    }
}
