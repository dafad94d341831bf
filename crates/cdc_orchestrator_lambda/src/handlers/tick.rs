use cdc_orchestrator_core::error::Result;
use cdc_orchestrator_core::{CdcTracker, Outcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::console::glue_job_run_url;

/// Body returned by one scheduled invocation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TickResponse {
    pub status: &'static str,
    pub tracker_key: String,
    pub evaluated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_run_console_url: Option<String>,
}

/// Runs one tracker step. A stale-state rejection means another invocation
/// committed first; the step is decided again once from the fresh state.
pub fn handle_tick(
    tracker: &CdcTracker<'_>,
    now: DateTime<Utc>,
    region: Option<&str>,
) -> Result<TickResponse> {
    let config = tracker.config();
    let outcome = retry_once_on_stale(|| tracker.advance(now)).map_err(|tick_error| {
        error!(
            component = "tick_handler",
            event = "tick_failed",
            tracker_key = config.tracker_key.as_str(),
            error = %tick_error,
        );
        tick_error
    })?;

    let job_run_console_url = match (outcome.started_run_id(), region) {
        (Some(run_id), Some(region)) => Some(glue_job_run_url(region, &config.job_name, run_id)),
        _ => None,
    };
    info!(
        component = "tick_handler",
        event = "tick_completed",
        tracker_key = config.tracker_key.as_str(),
        outcome = outcome.label(),
        console_url = job_run_console_url.as_deref().unwrap_or(""),
    );

    Ok(TickResponse {
        status: "ok",
        tracker_key: config.tracker_key.clone(),
        evaluated_at: now,
        outcome,
        job_run_console_url,
    })
}

fn retry_once_on_stale(mut step: impl FnMut() -> Result<Outcome>) -> Result<Outcome> {
    match step() {
        Err(stale) if stale.is_stale_state() => {
            warn!(
                component = "tick_handler",
                event = "stale_state_retry",
                orphaned_run_id = stale.orphaned_run_id().unwrap_or(""),
                error = %stale,
            );
            step()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdc_orchestrator_core::memory::{
        InMemoryObjectStore, InMemoryStateStore, ScriptedJobRunner,
    };
    use cdc_orchestrator_core::{Collaborators, Partition, TrackerConfig, TrackerError};
    use chrono::TimeZone;
    use std::cell::Cell;

    const TRACKER_KEY: &str = "projects/app/glue_jobs/incremental_glue_job_tracker.json";

    struct Fixture {
        config: TrackerConfig,
        store: InMemoryStateStore,
        objects: InMemoryObjectStore,
        runner: ScriptedJobRunner,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                config: TrackerConfig::new(
                    "app_incremental",
                    TRACKER_KEY,
                    "s3://lake-data/projects/app/glue_jobs/incremental_glue_job_input.json",
                    "projects/app/dynamodb_stream",
                    Partition::parse("2023-08-01-00-00").expect("epoch should parse"),
                ),
                store: InMemoryStateStore::new(),
                objects: InMemoryObjectStore::new("lake-data"),
                runner: ScriptedJobRunner::new(),
            }
        }

        fn tracker(&self) -> CdcTracker<'_> {
            CdcTracker::new(
                &self.config,
                Collaborators {
                    state_store: &self.store,
                    lister: &self.objects,
                    job_runner: &self.runner,
                    descriptor_sink: &self.objects,
                },
            )
            .expect("config should be valid")
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 8, 1, 0, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn started_job_includes_console_link() {
        let fixture = Fixture::new();
        fixture.objects.put_object(
            "projects/app/dynamodb_stream/update_at=2023-08-01-00-03/a.json",
            b"{}",
        );

        let response =
            handle_tick(&fixture.tracker(), at(10), Some("eu-west-1")).expect("tick should pass");

        assert_eq!(response.outcome.started_run_id(), Some("jr_0001"));
        let url = response
            .job_run_console_url
            .as_deref()
            .expect("console link should be present");
        assert!(url.contains("eu-west-1") && url.ends_with("/run/jr_0001"));

        let body = serde_json::to_value(&response).expect("response should serialize");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["outcome"], "started");
        assert_eq!(body["run_id"], "jr_0001");
        assert_eq!(body["tracker_key"], TRACKER_KEY);
    }

    #[test]
    fn idle_tick_omits_console_link() {
        let fixture = Fixture::new();

        let response =
            handle_tick(&fixture.tracker(), at(30), Some("eu-west-1")).expect("tick should pass");

        assert_eq!(response.outcome.label(), "no_op");
        let body = serde_json::to_value(&response).expect("response should serialize");
        assert!(body.get("job_run_console_url").is_none());
        assert_eq!(body["watermark"], "2023-08-01-00-28");
    }

    #[test]
    fn store_failures_surface_to_the_caller() {
        let fixture = Fixture::new();
        fixture.store.fail_with("access denied");

        let error = handle_tick(&fixture.tracker(), at(30), None).expect_err("tick should fail");
        assert!(matches!(error, TrackerError::StateStore(_)));
    }

    #[test]
    fn stale_state_is_retried_exactly_once() {
        let calls = Cell::new(0);
        let outcome = retry_once_on_stale(|| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(TrackerError::StaleState {
                    key: TRACKER_KEY.to_string(),
                    orphaned_run_id: Some("jr_0002".to_string()),
                })
            } else {
                Ok(Outcome::NoOp {
                    watermark: Partition::parse("2023-08-01-00-05").expect("partition should parse"),
                })
            }
        })
        .expect("retry should pass");

        assert_eq!(calls.get(), 2);
        assert_eq!(outcome.label(), "no_op");
    }

    #[test]
    fn repeated_stale_state_is_returned() {
        let calls = Cell::new(0);
        let result = retry_once_on_stale(|| {
            calls.set(calls.get() + 1);
            Err(TrackerError::StaleState {
                key: TRACKER_KEY.to_string(),
                orphaned_run_id: None,
            })
        });

        assert_eq!(calls.get(), 2);
        assert!(matches!(result, Err(TrackerError::StaleState { .. })));
    }
}
