use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::partition::Partition;
use crate::window::WindowLimits;

pub const DEFAULT_MAX_INCREMENTAL_FILES: usize = 100;
pub const DEFAULT_MAX_INCREMENTAL_INTERVAL_MINUTES: i64 = 365 * 24 * 60;
pub const DEFAULT_SAFETY_LAG_MINUTES: i64 = 2;

/// What to do with the watermark when a job run ends in a non-success
/// terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Treat every terminal state alike and move past the window.
    #[default]
    SkipAndAdvance,
    /// Keep the watermark so the next job re-reads the same window.
    RetrySameWindow,
}

/// Everything one tracker instance needs, built once at startup and passed
/// by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub job_name: String,
    /// State store key of the tracker blob.
    pub tracker_key: String,
    /// Fixed location of the job-input descriptor handed to every run.
    pub descriptor_uri: String,
    /// Key prefix of the minute-partitioned change stream objects.
    pub stream_prefix: String,
    pub epoch_processed_partition: Partition,
    pub max_incremental_interval: Duration,
    pub max_incremental_files: usize,
    pub safety_lag: Duration,
    pub on_failure: FailurePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid tracker configuration: {message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl TrackerConfig {
    pub fn new(
        job_name: impl Into<String>,
        tracker_key: impl Into<String>,
        descriptor_uri: impl Into<String>,
        stream_prefix: impl Into<String>,
        epoch_processed_partition: Partition,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            tracker_key: tracker_key.into(),
            descriptor_uri: descriptor_uri.into(),
            stream_prefix: stream_prefix.into(),
            epoch_processed_partition,
            max_incremental_interval: Duration::minutes(DEFAULT_MAX_INCREMENTAL_INTERVAL_MINUTES),
            max_incremental_files: DEFAULT_MAX_INCREMENTAL_FILES,
            safety_lag: Duration::minutes(DEFAULT_SAFETY_LAG_MINUTES),
            on_failure: FailurePolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_name.trim().is_empty() {
            return Err(ConfigError::new("job_name cannot be empty"));
        }
        if self.tracker_key.trim().is_empty() {
            return Err(ConfigError::new("tracker_key cannot be empty"));
        }
        if self.descriptor_uri.trim().is_empty() {
            return Err(ConfigError::new("descriptor_uri cannot be empty"));
        }
        if self.max_incremental_files == 0 {
            return Err(ConfigError::new(
                "max_incremental_files must be a positive integer",
            ));
        }
        if self.max_incremental_interval < Duration::minutes(1) {
            return Err(ConfigError::new(
                "max_incremental_interval must be at least one minute",
            ));
        }
        if self.safety_lag < Duration::zero() {
            return Err(ConfigError::new("safety_lag cannot be negative"));
        }
        Ok(())
    }

    pub fn window_limits(&self) -> WindowLimits {
        WindowLimits {
            safety_lag: self.safety_lag,
            max_incremental_interval: self.max_incremental_interval,
        }
    }
}
