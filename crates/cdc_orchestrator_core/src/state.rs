use serde::{Deserialize, Serialize};

use crate::config::FailurePolicy;
use crate::contract::JobRunStatus;
use crate::partition::Partition;

/// Persisted watermark tracker record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerState {
    pub last_processed_partition: Partition,
    pub next_processed_partition: Option<Partition>,
    pub last_job_run_id: Option<String>,
    pub ready_to_run_next_job: bool,
    pub epoch_processed_partition: Partition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase<'a> {
    Ready,
    InFlight { run_id: &'a str },
}

impl TrackerState {
    pub fn seed(epoch_processed_partition: Partition) -> Self {
        Self {
            last_processed_partition: epoch_processed_partition,
            next_processed_partition: None,
            last_job_run_id: None,
            ready_to_run_next_job: true,
            epoch_processed_partition,
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        match (self.ready_to_run_next_job, self.last_job_run_id.as_deref()) {
            (true, Some(run_id)) => {
                return Err(format!(
                    "tracker is ready to run but still references job run '{run_id}'"
                ));
            }
            (false, None) => {
                return Err("tracker is waiting on a job run but has no run id".to_string());
            }
            _ => {}
        }

        match self.next_processed_partition {
            Some(next) if next < self.last_processed_partition => {
                return Err(format!(
                    "next_processed_partition {next} is behind last_processed_partition {}",
                    self.last_processed_partition
                ));
            }
            None if !self.ready_to_run_next_job => {
                return Err(
                    "tracker is waiting on a job run but has no next_processed_partition"
                        .to_string(),
                );
            }
            _ => {}
        }

        if self.last_processed_partition < self.epoch_processed_partition {
            return Err(format!(
                "last_processed_partition {} is behind epoch_processed_partition {}",
                self.last_processed_partition, self.epoch_processed_partition
            ));
        }

        Ok(())
    }

    pub fn phase(&self) -> Result<TrackerPhase<'_>, String> {
        self.check_invariants()?;
        match self.last_job_run_id.as_deref() {
            Some(run_id) if !self.ready_to_run_next_job => Ok(TrackerPhase::InFlight { run_id }),
            _ => Ok(TrackerPhase::Ready),
        }
    }

    /// Moves the watermark forward without a job, e.g. across an empty window.
    pub fn skip_to(&mut self, partition: Partition) {
        self.last_processed_partition = self.last_processed_partition.max(partition);
        self.next_processed_partition = None;
        self.last_job_run_id = None;
        self.ready_to_run_next_job = true;
    }

    pub fn mark_in_flight(&mut self, run_id: String, next_processed_partition: Partition) {
        self.next_processed_partition = Some(next_processed_partition);
        self.last_job_run_id = Some(run_id);
        self.ready_to_run_next_job = false;
    }

    /// Folds a terminal run back into the watermark and returns to READY.
    ///
    /// Returns `true` when the watermark moved.
    pub fn reconcile(&mut self, status: JobRunStatus, policy: FailurePolicy) -> bool {
        let previous = self.last_processed_partition;
        let advance = match policy {
            FailurePolicy::SkipAndAdvance => true,
            FailurePolicy::RetrySameWindow => status.is_success(),
        };
        if advance {
            if let Some(next) = self.next_processed_partition {
                self.last_processed_partition = previous.max(next);
            }
        }
        self.next_processed_partition = None;
        self.last_job_run_id = None;
        self.ready_to_run_next_job = true;
        self.last_processed_partition != previous
    }
}
