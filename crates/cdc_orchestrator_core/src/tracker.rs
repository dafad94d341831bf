//! Watermark tracker: decides each tick whether to submit the next
//! incremental job or to poll the one in flight.
//!
//! One tick is `read state -> decide -> act -> persist`. Every persist is a
//! conditional write against the version that was read, so two overlapping
//! ticks can never silently clobber each other.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::TrackerConfig;
use crate::contract::{JobInputDescriptor, JobRunStatus, Outcome, SkipReason};
use crate::error::{Result, TrackerError};
use crate::partition::Partition;
use crate::ports::{
    DescriptorSink, JobRunner, JobRunnerError, ObjectLister, StateStore, StoreError,
    WritePrecondition,
};
use crate::state::{TrackerPhase, TrackerState};
use crate::window::{collect_window_objects, compute_window, Window, WindowObjects};

const COMPONENT: &str = "cdc_tracker";

/// Tracker state together with the store version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: TrackerState,
    pub version: String,
}

pub struct Collaborators<'a> {
    pub state_store: &'a dyn StateStore,
    pub lister: &'a dyn ObjectLister,
    pub job_runner: &'a dyn JobRunner,
    pub descriptor_sink: &'a dyn DescriptorSink,
}

pub struct CdcTracker<'a> {
    config: &'a TrackerConfig,
    deps: Collaborators<'a>,
}

enum Submission {
    WindowNotOpen,
    Empty { watermark: Partition },
    Started { run_id: String, window: Window },
    Skipped(SkipReason),
}

impl<'a> CdcTracker<'a> {
    pub fn new(config: &'a TrackerConfig, deps: Collaborators<'a>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, deps })
    }

    pub fn config(&self) -> &TrackerConfig {
        self.config
    }

    /// Loads the persisted state without creating it.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        match self.read_snapshot() {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(TrackerError::StateStore(StoreError::NotFound)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Loads the persisted state, creating and persisting the seed state on
    /// first use.
    pub fn read_or_initialize(&self) -> Result<Snapshot> {
        if let Some(snapshot) = self.load()? {
            return Ok(snapshot);
        }

        let seed = TrackerState::seed(self.config.epoch_processed_partition);
        match self.persist(&seed, WritePrecondition::DoesNotExist) {
            Ok(version) => {
                info!(
                    component = COMPONENT,
                    event = "tracker_initialized",
                    tracker_key = %self.config.tracker_key,
                    epoch = %seed.epoch_processed_partition,
                );
                Ok(Snapshot {
                    state: seed,
                    version,
                })
            }
            // Another tick created it first; its state is the one to use.
            Err(TrackerError::StaleState { .. }) => self.read_snapshot(),
            Err(error) => Err(error),
        }
    }

    /// Runs exactly one state machine step against freshly read state.
    pub fn advance(&self, now: DateTime<Utc>) -> Result<Outcome> {
        let snapshot = self.read_or_initialize()?;
        self.advance_from(snapshot, now)
    }

    /// Runs one step against an already loaded snapshot.
    pub fn advance_from(&self, snapshot: Snapshot, now: DateTime<Utc>) -> Result<Outcome> {
        let Snapshot { mut state, version } = snapshot;
        let run_id = match state.phase().map_err(TrackerError::InconsistentState)? {
            TrackerPhase::Ready => None,
            TrackerPhase::InFlight { run_id } => Some(run_id.to_string()),
        };

        let Some(run_id) = run_id else {
            return Ok(match self.submit_next(&mut state, version, now)? {
                Submission::WindowNotOpen => Outcome::NoOp {
                    watermark: state.last_processed_partition,
                },
                Submission::Empty { watermark } => Outcome::NoOp { watermark },
                Submission::Started { run_id, window } => Outcome::Started { run_id, window },
                Submission::Skipped(reason) => Outcome::Skipped { reason },
            });
        };

        let status = self
            .deps
            .job_runner
            .get_status(&self.config.job_name, &run_id)
            .map_err(TrackerError::JobRunner)?;

        if !status.is_terminal() {
            info!(
                component = COMPONENT,
                event = "job_still_running",
                run_id = %run_id,
                status = %status,
            );
            return Ok(Outcome::StillRunning { run_id, status });
        }

        let version = self.reconcile(&mut state, version, &run_id, status)?;
        Ok(match self.submit_next(&mut state, version, now)? {
            Submission::WindowNotOpen => Outcome::ReconciledNoOp {
                previous_status: status,
                watermark: state.last_processed_partition,
            },
            Submission::Empty { watermark } => Outcome::ReconciledNoOp {
                previous_status: status,
                watermark,
            },
            Submission::Started { run_id, window } => Outcome::ReconciledAndStarted {
                previous_status: status,
                run_id,
                window,
            },
            Submission::Skipped(reason) => Outcome::ReconciledAndSkipped {
                previous_status: status,
                reason,
            },
        })
    }

    fn reconcile(
        &self,
        state: &mut TrackerState,
        version: String,
        run_id: &str,
        status: JobRunStatus,
    ) -> Result<String> {
        let previous = state.last_processed_partition;
        let advanced = state.reconcile(status, self.config.on_failure);
        if !status.is_success() {
            warn!(
                component = COMPONENT,
                event = "job_run_unsuccessful",
                run_id = %run_id,
                status = %status,
                watermark_advanced = advanced,
                on_failure = ?self.config.on_failure,
            );
        }
        let version = self.persist(state, WritePrecondition::MatchesVersion(version))?;
        info!(
            component = COMPONENT,
            event = "job_reconciled",
            run_id = %run_id,
            status = %status,
            previous_watermark = %previous,
            watermark = %state.last_processed_partition,
        );
        Ok(version)
    }

    fn submit_next(
        &self,
        state: &mut TrackerState,
        version: String,
        now: DateTime<Utc>,
    ) -> Result<Submission> {
        let Some(window) = compute_window(
            state.last_processed_partition,
            now,
            &self.config.window_limits(),
        ) else {
            debug!(
                component = COMPONENT,
                event = "window_not_open",
                watermark = %state.last_processed_partition,
            );
            return Ok(Submission::WindowNotOpen);
        };

        let WindowObjects { objects, truncated } = collect_window_objects(
            self.deps.lister,
            &self.config.stream_prefix,
            &window,
            self.config.max_incremental_files,
        )?;

        if objects.is_empty() {
            state.skip_to(window.end_partition);
            self.persist(state, WritePrecondition::MatchesVersion(version))?;
            info!(
                component = COMPONENT,
                event = "window_empty",
                start_partition = %window.start_partition,
                end_partition = %window.end_partition,
                watermark = %state.last_processed_partition,
            );
            return Ok(Submission::Empty {
                watermark: state.last_processed_partition,
            });
        }

        let object_count = objects.len();
        let descriptor = JobInputDescriptor::new(
            &window,
            objects.into_iter().map(|object| object.uri).collect(),
        );
        let payload = descriptor
            .to_json_bytes()
            .map_err(TrackerError::DescriptorEncoding)?;
        self.deps
            .descriptor_sink
            .write_descriptor(&self.config.descriptor_uri, &payload)?;

        let run_id = match self
            .deps
            .job_runner
            .submit(&self.config.job_name, &self.config.descriptor_uri)
        {
            Ok(run_id) => run_id,
            Err(JobRunnerError::ConcurrencyLimitExceeded(detail)) => {
                warn!(
                    component = COMPONENT,
                    event = "submission_skipped",
                    reason = "concurrency_limit",
                    detail = %detail,
                );
                return Ok(Submission::Skipped(SkipReason::ConcurrencyLimit));
            }
            Err(error) => return Err(TrackerError::JobRunner(error)),
        };

        state.mark_in_flight(run_id.clone(), window.end_partition);
        if let Err(persist_error) = self.persist(state, WritePrecondition::MatchesVersion(version))
        {
            // The run is live but the stored state does not reference it.
            error!(
                component = COMPONENT,
                event = "orphaned_run",
                run_id = %run_id,
                job_name = %self.config.job_name,
                start_partition = %window.start_partition,
                end_partition = %window.end_partition,
                error = %persist_error,
            );
            return Err(match persist_error {
                TrackerError::StaleState { key, .. } => TrackerError::StaleState {
                    key,
                    orphaned_run_id: Some(run_id),
                },
                other => other,
            });
        }
        info!(
            component = COMPONENT,
            event = "job_started",
            run_id = %run_id,
            job_name = %self.config.job_name,
            start_partition = %window.start_partition,
            end_partition = %window.end_partition,
            object_count,
            truncated,
            fingerprint = %descriptor.fingerprint,
        );
        Ok(Submission::Started { run_id, window })
    }

    fn read_snapshot(&self) -> Result<Snapshot> {
        let key = &self.config.tracker_key;
        let blob = self
            .deps
            .state_store
            .read(key)
            .map_err(TrackerError::StateStore)?;
        let state: TrackerState =
            serde_json::from_slice(&blob.body).map_err(|source| TrackerError::CorruptState {
                key: key.clone(),
                source,
            })?;
        state
            .check_invariants()
            .map_err(TrackerError::InconsistentState)?;

        if state.epoch_processed_partition != self.config.epoch_processed_partition {
            warn!(
                component = COMPONENT,
                event = "epoch_mismatch",
                stored_epoch = %state.epoch_processed_partition,
                configured_epoch = %self.config.epoch_processed_partition,
            );
        }

        Ok(Snapshot {
            state,
            version: blob.version,
        })
    }

    fn persist(&self, state: &TrackerState, precondition: WritePrecondition) -> Result<String> {
        state
            .check_invariants()
            .map_err(TrackerError::InconsistentState)?;
        let key = &self.config.tracker_key;
        let body =
            serde_json::to_vec_pretty(state).map_err(|source| TrackerError::StateEncoding {
                key: key.clone(),
                source,
            })?;
        self.deps
            .state_store
            .write(key, &body, precondition)
            .map_err(|error| match error {
                StoreError::PreconditionFailed => TrackerError::StaleState {
                    key: key.clone(),
                    orphaned_run_id: None,
                },
                other => TrackerError::StateStore(other),
            })
    }
}
