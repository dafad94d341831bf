use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::partition::Partition;
use crate::window::Window;

pub const DESCRIPTOR_SCHEMA_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobRunStatus {
    Starting,
    Running,
    Stopping,
    Waiting,
    Stopped,
    Succeeded,
    Failed,
    Timeout,
    Error,
    Expired,
}

impl JobRunStatus {
    pub const ALL: [JobRunStatus; 10] = [
        Self::Starting,
        Self::Running,
        Self::Stopping,
        Self::Waiting,
        Self::Stopped,
        Self::Succeeded,
        Self::Failed,
        Self::Timeout,
        Self::Error,
        Self::Expired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Waiting => "WAITING",
            Self::Stopped => "STOPPED",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Error => "ERROR",
            Self::Expired => "EXPIRED",
        }
    }

    /// Parses the wire form used by the job runner. Unknown values are
    /// rejected rather than guessed.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Stopped
                | Self::Succeeded
                | Self::Failed
                | Self::Timeout
                | Self::Error
                | Self::Expired
        )
    }

    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

impl std::fmt::Display for JobRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input handed to the incremental job: the window bounds plus the exact
/// object list it must fold in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobInputDescriptor {
    pub schema_version: String,
    pub start_after_partition: Partition,
    pub end_before_partition: Partition,
    pub object_uris: Vec<String>,
    pub fingerprint: String,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    start_after_partition: Partition,
    end_before_partition: Partition,
    object_uris: &'a [String],
}

impl JobInputDescriptor {
    pub fn new(window: &Window, object_uris: Vec<String>) -> Self {
        let start_after_partition = window.start_partition;
        let end_before_partition = window.end_before_partition();
        let fingerprint = descriptor_fingerprint(&FingerprintInput {
            start_after_partition,
            end_before_partition,
            object_uris: &object_uris,
        });
        Self {
            schema_version: DESCRIPTOR_SCHEMA_VERSION.to_string(),
            start_after_partition,
            end_before_partition,
            object_uris,
            fingerprint,
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

fn descriptor_fingerprint(input: &FingerprintInput<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stable_contract_json(input));
    format!("{:x}", hasher.finalize())
}

pub fn stable_contract_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).expect("serialization of contract value should not fail")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The job runner already has an active run.
    ConcurrencyLimit,
}

/// Result of one tracker step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    NoOp {
        watermark: Partition,
    },
    Started {
        run_id: String,
        window: Window,
    },
    Skipped {
        reason: SkipReason,
    },
    StillRunning {
        run_id: String,
        status: JobRunStatus,
    },
    ReconciledAndStarted {
        previous_status: JobRunStatus,
        run_id: String,
        window: Window,
    },
    ReconciledNoOp {
        previous_status: JobRunStatus,
        watermark: Partition,
    },
    ReconciledAndSkipped {
        previous_status: JobRunStatus,
        reason: SkipReason,
    },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoOp { .. } => "no_op",
            Self::Started { .. } => "started",
            Self::Skipped { .. } => "skipped",
            Self::StillRunning { .. } => "still_running",
            Self::ReconciledAndStarted { .. } => "reconciled_and_started",
            Self::ReconciledNoOp { .. } => "reconciled_no_op",
            Self::ReconciledAndSkipped { .. } => "reconciled_and_skipped",
        }
    }

    /// Run id submitted during this step, if any.
    pub fn started_run_id(&self) -> Option<&str> {
        match self {
            Self::Started { run_id, .. } | Self::ReconciledAndStarted { run_id, .. } => {
                Some(run_id.as_str())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Window {
        Window {
            start_partition: Partition::parse("2023-08-01-00-01").expect("partition should parse"),
            end_partition: Partition::parse("2023-08-01-00-08").expect("partition should parse"),
        }
    }

    #[test]
    fn parses_runner_status_strings() {
        assert_eq!(JobRunStatus::parse("SUCCEEDED"), Some(JobRunStatus::Succeeded));
        assert_eq!(JobRunStatus::parse("timeout"), Some(JobRunStatus::Timeout));
        assert_eq!(JobRunStatus::parse("PAUSED"), None);
    }

    #[test]
    fn terminal_statuses_match_runner_contract() {
        let terminal: Vec<JobRunStatus> = JobRunStatus::ALL
            .into_iter()
            .filter(|status| status.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                JobRunStatus::Stopped,
                JobRunStatus::Succeeded,
                JobRunStatus::Failed,
                JobRunStatus::Timeout,
                JobRunStatus::Error,
                JobRunStatus::Expired,
            ]
        );
    }

    #[test]
    fn descriptor_records_exclusive_end_bound() {
        let descriptor = JobInputDescriptor::new(
            &window(),
            vec!["s3://lake/cdc/update_at=2023-08-01-00-02/a.json".to_string()],
        );

        assert_eq!(descriptor.start_after_partition.to_string(), "2023-08-01-00-01");
        assert_eq!(descriptor.end_before_partition.to_string(), "2023-08-01-00-09");
        assert_eq!(descriptor.schema_version, DESCRIPTOR_SCHEMA_VERSION);
        assert_eq!(descriptor.fingerprint.len(), 64);
    }

    #[test]
    fn descriptor_fingerprint_changes_with_object_list() {
        let first = JobInputDescriptor::new(&window(), vec!["s3://lake/a".to_string()]);
        let same = JobInputDescriptor::new(&window(), vec!["s3://lake/a".to_string()]);
        let other = JobInputDescriptor::new(&window(), vec!["s3://lake/b".to_string()]);

        assert_eq!(first.fingerprint, same.fingerprint);
        assert_ne!(first.fingerprint, other.fingerprint);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let outcome = Outcome::StillRunning {
            run_id: "jr_123".to_string(),
            status: JobRunStatus::Running,
        };
        let value = serde_json::to_value(&outcome).expect("outcome should serialize");
        assert_eq!(
            value,
            serde_json::json!({"outcome": "still_running", "run_id": "jr_123", "status": "RUNNING"})
        );
        assert_eq!(outcome.label(), "still_running");
        assert_eq!(outcome.started_run_id(), None);
    }
}
