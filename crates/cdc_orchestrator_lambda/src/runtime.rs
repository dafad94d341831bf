//! Wiring of AWS clients into tracker collaborators.

use cdc_orchestrator_core::{CdcTracker, Collaborators, TrackerError};

use crate::adapters::glue::GlueJobRunner;
use crate::adapters::s3_objects::{S3DescriptorSink, S3ObjectLister};
use crate::adapters::s3_state_store::S3StateStore;
use crate::settings::ResolvedSettings;

/// Collaborators built once per process and reused across invocations.
#[derive(Clone)]
pub struct RuntimeDependencies {
    pub settings: ResolvedSettings,
    pub region: Option<String>,
    state_store: S3StateStore,
    lister: S3ObjectLister,
    job_runner: GlueJobRunner,
    descriptor_sink: S3DescriptorSink,
}

impl RuntimeDependencies {
    pub async fn load(settings: ResolvedSettings) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let s3_client = aws_sdk_s3::Client::new(&aws_config);
        let glue_client = aws_sdk_glue::Client::new(&aws_config);

        Self {
            region: aws_config.region().map(|region| region.to_string()),
            state_store: S3StateStore::new(s3_client.clone(), settings.tracker_uri.bucket.clone()),
            lister: S3ObjectLister::new(s3_client.clone(), settings.stream_bucket.clone()),
            job_runner: GlueJobRunner::new(glue_client),
            descriptor_sink: S3DescriptorSink::new(s3_client),
            settings,
        }
    }

    pub fn job_runner(&self) -> &GlueJobRunner {
        &self.job_runner
    }

    pub fn tracker(&self) -> Result<CdcTracker<'_>, TrackerError> {
        CdcTracker::new(
            &self.settings.tracker,
            Collaborators {
                state_store: &self.state_store,
                lister: &self.lister,
                job_runner: &self.job_runner,
                descriptor_sink: &self.descriptor_sink,
            },
        )
    }
}
