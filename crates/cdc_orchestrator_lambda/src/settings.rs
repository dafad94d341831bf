//! Runtime settings resolved from command-line flags and `CDC_*` environment
//! variables.

use cdc_orchestrator_core::config::{
    ConfigError, DEFAULT_MAX_INCREMENTAL_FILES, DEFAULT_MAX_INCREMENTAL_INTERVAL_MINUTES,
    DEFAULT_SAFETY_LAG_MINUTES,
};
use cdc_orchestrator_core::{FailurePolicy, Partition, TrackerConfig};
use chrono::Duration;
use clap::{Args, Parser, ValueEnum};

use crate::adapters::s3_uri::{InvalidS3Uri, S3Uri};
use crate::observability::LogFormat;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OnFailure {
    /// Advance past the failed window; its data is not reprocessed.
    #[default]
    SkipAndAdvance,
    /// Leave the watermark in place so the next tick resubmits the window.
    RetrySameWindow,
}

impl From<OnFailure> for FailurePolicy {
    fn from(value: OnFailure) -> Self {
        match value {
            OnFailure::SkipAndAdvance => FailurePolicy::SkipAndAdvance,
            OnFailure::RetrySameWindow => FailurePolicy::RetrySameWindow,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct OrchestratorSettings {
    /// S3 URI of the tracker state object.
    #[arg(long, env = "CDC_TRACKER_URI")]
    pub tracker_uri: String,
    /// S3 URI the job input descriptor is written to before each submission.
    #[arg(long, env = "CDC_DESCRIPTOR_URI")]
    pub descriptor_uri: String,
    /// S3 URI of the change stream root holding `update_at=` partitions.
    #[arg(long, env = "CDC_STREAM_URI")]
    pub stream_uri: String,
    #[arg(long, env = "CDC_GLUE_JOB_NAME")]
    pub glue_job_name: String,
    /// Watermark used when no tracker state exists, as `YYYY-MM-DD-HH-MM`.
    #[arg(long, env = "CDC_EPOCH_PARTITION")]
    pub epoch_partition: String,
    #[arg(
        long,
        env = "CDC_MAX_INCREMENTAL_INTERVAL_MINUTES",
        default_value_t = DEFAULT_MAX_INCREMENTAL_INTERVAL_MINUTES as u32
    )]
    pub max_incremental_interval_minutes: u32,
    #[arg(long, env = "CDC_MAX_INCREMENTAL_FILES", default_value_t = DEFAULT_MAX_INCREMENTAL_FILES)]
    pub max_incremental_files: usize,
    #[arg(
        long,
        env = "CDC_SAFETY_LAG_MINUTES",
        default_value_t = DEFAULT_SAFETY_LAG_MINUTES as u32
    )]
    pub safety_lag_minutes: u32,
    #[arg(long, value_enum, env = "CDC_ON_FAILURE", default_value_t = OnFailure::default())]
    pub on_failure: OnFailure,
    #[arg(long, value_enum, env = "CDC_LOG_FORMAT", default_value_t = LogFormat::default())]
    pub log_format: LogFormat,
}

/// Settings after URI and partition parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub tracker: TrackerConfig,
    pub tracker_uri: S3Uri,
    pub stream_bucket: String,
}

#[derive(Debug, Parser)]
struct EnvOnly {
    #[command(flatten)]
    settings: OrchestratorSettings,
}

impl OrchestratorSettings {
    /// Reads every setting from the environment, as the Lambda runtime does.
    pub fn from_env() -> Result<Self, clap::Error> {
        EnvOnly::try_parse_from([env!("CARGO_PKG_NAME")]).map(|parsed| parsed.settings)
    }

    pub fn resolve(&self) -> Result<ResolvedSettings, ConfigError> {
        let tracker_uri = S3Uri::parse_object(&self.tracker_uri)
            .map_err(|error| invalid("CDC_TRACKER_URI", error))?;
        S3Uri::parse_object(&self.descriptor_uri)
            .map_err(|error| invalid("CDC_DESCRIPTOR_URI", error))?;
        let stream_uri =
            S3Uri::parse(&self.stream_uri).map_err(|error| invalid("CDC_STREAM_URI", error))?;
        let epoch = Partition::parse(&self.epoch_partition)
            .map_err(|error| ConfigError::new(format!("CDC_EPOCH_PARTITION: {error}")))?;

        let mut tracker = TrackerConfig::new(
            self.glue_job_name.trim(),
            tracker_uri.key.clone(),
            self.descriptor_uri.trim(),
            stream_uri.key.clone(),
            epoch,
        );
        tracker.max_incremental_interval =
            Duration::minutes(i64::from(self.max_incremental_interval_minutes));
        tracker.max_incremental_files = self.max_incremental_files;
        tracker.safety_lag = Duration::minutes(i64::from(self.safety_lag_minutes));
        tracker.on_failure = self.on_failure.into();
        tracker.validate()?;

        Ok(ResolvedSettings {
            tracker,
            tracker_uri,
            stream_bucket: stream_uri.bucket,
        })
    }
}

fn invalid(variable: &str, error: InvalidS3Uri) -> ConfigError {
    ConfigError::new(format!("{variable}: {error}"))
}
