#![allow(dead_code)]

use cdc_orchestrator_core::memory::{InMemoryObjectStore, InMemoryStateStore, ScriptedJobRunner};
use cdc_orchestrator_core::{CdcTracker, Collaborators, Partition, TrackerConfig, TrackerState};
use chrono::{DateTime, TimeZone, Utc};

pub const BUCKET: &str = "lake-data";
pub const STREAM_PREFIX: &str = "projects/app/dynamodb_stream";
pub const DESCRIPTOR_URI: &str = "s3://lake-data/projects/app/glue_jobs/incremental_glue_job_input.json";
pub const TRACKER_KEY: &str = "projects/app/glue_jobs/incremental_glue_job_tracker.json";
pub const EPOCH: &str = "2023-08-01-00-00";

pub fn partition(value: &str) -> Partition {
    Partition::parse(value).expect("partition should parse")
}

pub fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 8, 1, hour, minute, second)
        .single()
        .expect("valid timestamp")
}

pub fn base_config() -> TrackerConfig {
    TrackerConfig::new(
        "app_incremental",
        TRACKER_KEY,
        DESCRIPTOR_URI,
        STREAM_PREFIX,
        partition(EPOCH),
    )
}

pub fn stream_key(partition: &str, file: &str) -> String {
    format!("{STREAM_PREFIX}/update_at={partition}/{file}")
}

pub struct Harness {
    pub config: TrackerConfig,
    pub store: InMemoryStateStore,
    pub objects: InMemoryObjectStore,
    pub runner: ScriptedJobRunner,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(base_config())
    }

    pub fn with_config(config: TrackerConfig) -> Self {
        Self::with_runner(config, ScriptedJobRunner::new())
    }

    pub fn with_runner(config: TrackerConfig, runner: ScriptedJobRunner) -> Self {
        Self {
            config,
            store: InMemoryStateStore::new(),
            objects: InMemoryObjectStore::new(BUCKET).with_page_size(25),
            runner,
        }
    }

    pub fn tracker(&self) -> CdcTracker<'_> {
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

    pub fn put_stream_object(&self, partition: &str, file: &str) {
        self.objects.put_object(&stream_key(partition, file), b"{}");
    }

    pub fn state(&self) -> TrackerState {
        let body = self.store.body(TRACKER_KEY).expect("tracker should be persisted");
        serde_json::from_slice(&body).expect("tracker should be valid JSON")
    }
}
