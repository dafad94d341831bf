use aws_sdk_glue::error::DisplayErrorContext;
use cdc_orchestrator_core::ports::{JobRunner, JobRunnerError};
use cdc_orchestrator_core::JobRunStatus;
use tracing::debug;

use super::block_on;

/// Job argument carrying the S3 URI of the job input descriptor.
pub const INPUT_DESCRIPTOR_ARGUMENT: &str = "--S3URI_INCREMENTAL_GLUE_JOB_INPUT";

/// Submits and polls AWS Glue job runs.
#[derive(Clone)]
pub struct GlueJobRunner {
    client: aws_sdk_glue::Client,
}

impl GlueJobRunner {
    pub fn new(client: aws_sdk_glue::Client) -> Self {
        Self { client }
    }
}

impl JobRunner for GlueJobRunner {
    fn submit(&self, job_name: &str, input_descriptor_uri: &str) -> Result<String, JobRunnerError> {
        let client = self.client.clone();
        let job = job_name.to_string();
        let descriptor_uri = input_descriptor_uri.to_string();

        block_on(async move {
            let output = client
                .start_job_run()
                .job_name(job)
                .arguments(INPUT_DESCRIPTOR_ARGUMENT, descriptor_uri)
                .send()
                .await
                .map_err(|error| match error.as_service_error() {
                    Some(service_error) if service_error.is_concurrent_runs_exceeded_exception() => {
                        JobRunnerError::ConcurrencyLimitExceeded(service_error.to_string())
                    }
                    _ => JobRunnerError::Other(format!(
                        "failed to start glue job run: {}",
                        DisplayErrorContext(&error)
                    )),
                })?;
            output.job_run_id().map(str::to_string).ok_or_else(|| {
                JobRunnerError::Other("glue accepted the job run without a run id".to_string())
            })
        })
    }

    fn get_status(&self, job_name: &str, run_id: &str) -> Result<JobRunStatus, JobRunnerError> {
        let client = self.client.clone();
        let job = job_name.to_string();
        let run = run_id.to_string();

        let state = block_on(async move {
            let output = client
                .get_job_run()
                .job_name(job)
                .run_id(run)
                .send()
                .await
                .map_err(|error| {
                    JobRunnerError::Other(format!(
                        "failed to read glue job run: {}",
                        DisplayErrorContext(&error)
                    ))
                })?;
            output
                .job_run()
                .and_then(|job_run| job_run.job_run_state())
                .map(|state| state.as_str().to_string())
                .ok_or_else(|| {
                    JobRunnerError::Other("glue returned a job run without a state".to_string())
                })
        })?;

        debug!(
            component = "glue_job_runner",
            event = "job_run_state",
            job_name,
            run_id,
            state = state.as_str(),
        );
        parse_job_run_state(&state)
    }
}

fn parse_job_run_state(state: &str) -> Result<JobRunStatus, JobRunnerError> {
    JobRunStatus::parse(state).ok_or_else(|| JobRunnerError::UnknownStatus(state.to_string()))
}
