//! In-memory collaborators for tests and local dry runs.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::contract::{JobInputDescriptor, JobRunStatus};
use crate::ports::{
    DescriptorSink, JobRunner, JobRunnerError, ListError, ObjectDescriptor, ObjectIter,
    ObjectLister, SinkError, StateStore, StoreError, VersionedBlob, WritePrecondition,
};

const DEFAULT_PAGE_SIZE: usize = 1_000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct StoredBlob {
    body: Vec<u8>,
    version: u64,
}

/// Versioned key/value store honoring write preconditions.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    blobs: Mutex<BTreeMap<String, StoredBlob>>,
    next_version: Mutex<u64>,
    failure: Mutex<Option<String>>,
    writes: Mutex<usize>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent read and write fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    pub fn body(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.blobs).get(key).map(|blob| blob.body.clone())
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        *lock(&self.writes)
    }

    /// Overwrites `key` behind the tracker's back, bumping its version.
    pub fn put_raw(&self, key: &str, body: &[u8]) -> String {
        let version = self.bump_version();
        lock(&self.blobs).insert(
            key.to_string(),
            StoredBlob {
                body: body.to_vec(),
                version,
            },
        );
        version.to_string()
    }

    fn bump_version(&self) -> u64 {
        let mut next = lock(&self.next_version);
        *next += 1;
        *next
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        match lock(&self.failure).as_ref() {
            Some(message) => Err(StoreError::Other(message.clone())),
            None => Ok(()),
        }
    }
}

impl StateStore for InMemoryStateStore {
    fn read(&self, key: &str) -> Result<VersionedBlob, StoreError> {
        self.check_failure()?;
        lock(&self.blobs)
            .get(key)
            .map(|blob| VersionedBlob {
                body: blob.body.clone(),
                version: blob.version.to_string(),
            })
            .ok_or(StoreError::NotFound)
    }

    fn write(
        &self,
        key: &str,
        body: &[u8],
        precondition: WritePrecondition,
    ) -> Result<String, StoreError> {
        self.check_failure()?;
        let mut blobs = lock(&self.blobs);
        let current = blobs.get(key);
        match precondition {
            WritePrecondition::DoesNotExist if current.is_some() => {
                return Err(StoreError::PreconditionFailed);
            }
            WritePrecondition::MatchesVersion(expected) => match current {
                Some(blob) if blob.version.to_string() == expected => {}
                _ => return Err(StoreError::PreconditionFailed),
            },
            WritePrecondition::DoesNotExist => {}
        }

        let version = self.bump_version();
        blobs.insert(
            key.to_string(),
            StoredBlob {
                body: body.to_vec(),
                version,
            },
        );
        *lock(&self.writes) += 1;
        Ok(version.to_string())
    }
}

/// Bucket-like object store: lists stream objects and receives descriptors.
#[derive(Debug)]
pub struct InMemoryObjectStore {
    bucket: String,
    page_size: usize,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    descriptors: Mutex<BTreeMap<String, Vec<u8>>>,
    list_failure: Mutex<Option<String>>,
    descriptor_failure: Mutex<Option<String>>,
    pages_fetched: Mutex<usize>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            page_size: DEFAULT_PAGE_SIZE,
            objects: Mutex::new(BTreeMap::new()),
            descriptors: Mutex::new(BTreeMap::new()),
            list_failure: Mutex::new(None),
            descriptor_failure: Mutex::new(None),
            pages_fetched: Mutex::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn put_object(&self, key: &str, body: &[u8]) {
        lock(&self.objects).insert(key.to_string(), body.to_vec());
    }

    pub fn fail_listing(&self, message: impl Into<String>) {
        *lock(&self.list_failure) = Some(message.into());
    }

    pub fn fail_descriptor_writes(&self, message: impl Into<String>) {
        *lock(&self.descriptor_failure) = Some(message.into());
    }

    pub fn pages_fetched(&self) -> usize {
        *lock(&self.pages_fetched)
    }

    pub fn descriptor(&self, uri: &str) -> Option<JobInputDescriptor> {
        lock(&self.descriptors)
            .get(uri)
            .and_then(|body| serde_json::from_slice(body).ok())
    }

    pub fn descriptor_count(&self) -> usize {
        lock(&self.descriptors).len()
    }

    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{key}", self.bucket)
    }

    fn fetch_page(&self, prefix: &str, after: &str) -> Result<Vec<ObjectDescriptor>, ListError> {
        if let Some(message) = lock(&self.list_failure).as_ref() {
            return Err(ListError::Other(message.clone()));
        }
        *lock(&self.pages_fetched) += 1;
        let objects = lock(&self.objects);
        Ok(objects
            .range::<str, _>((Bound::Excluded(after), Bound::Unbounded))
            .map(|(key, _)| key)
            .filter(|key| key.starts_with(prefix))
            .take(self.page_size)
            .map(|key| ObjectDescriptor {
                key: key.clone(),
                uri: self.uri(key),
            })
            .collect())
    }
}

struct MemoryListing<'a> {
    store: &'a InMemoryObjectStore,
    prefix: String,
    cursor: String,
    buffer: VecDeque<ObjectDescriptor>,
    exhausted: bool,
}

impl Iterator for MemoryListing<'_> {
    type Item = Result<ObjectDescriptor, ListError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.store.fetch_page(&self.prefix, &self.cursor) {
                Ok(page) => {
                    self.exhausted = page.len() < self.store.page_size;
                    if let Some(last) = page.last() {
                        self.cursor = last.key.clone();
                    }
                    self.buffer.extend(page);
                }
                Err(error) => {
                    self.exhausted = true;
                    return Some(Err(error));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl ObjectLister for InMemoryObjectStore {
    fn list<'a>(&'a self, prefix: &str, start_after_key: &str) -> ObjectIter<'a> {
        Box::new(MemoryListing {
            store: self,
            prefix: prefix.to_string(),
            cursor: start_after_key.to_string(),
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }
}

impl DescriptorSink for InMemoryObjectStore {
    fn write_descriptor(&self, uri: &str, json_payload: &[u8]) -> Result<(), SinkError> {
        if let Some(message) = lock(&self.descriptor_failure).as_ref() {
            return Err(SinkError::Other(message.clone()));
        }
        lock(&self.descriptors).insert(uri.to_string(), json_payload.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedRun {
    pub run_id: String,
    pub job_name: String,
    pub descriptor_uri: String,
}

#[derive(Debug, Default)]
struct RunnerState {
    submitted: Vec<SubmittedRun>,
    statuses: HashMap<String, JobRunStatus>,
    submit_failure: Option<JobRunnerError>,
    status_failure: Option<JobRunnerError>,
}

/// Job runner whose run statuses are set by the test. Like a job configured
/// with one maximum concurrent run, it rejects a submission while any run is
/// non-terminal.
#[derive(Debug)]
pub struct ScriptedJobRunner {
    max_concurrent_runs: Option<usize>,
    state: Mutex<RunnerState>,
}

impl Default for ScriptedJobRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedJobRunner {
    pub fn new() -> Self {
        Self {
            max_concurrent_runs: Some(1),
            state: Mutex::new(RunnerState::default()),
        }
    }

    /// A runner with no concurrency guard at all.
    pub fn unguarded() -> Self {
        Self {
            max_concurrent_runs: None,
            state: Mutex::new(RunnerState::default()),
        }
    }

    /// Sets the status of the most recently submitted run.
    pub fn finish_latest(&self, status: JobRunStatus) {
        let mut state = lock(&self.state);
        if let Some(run_id) = state.submitted.last().map(|run| run.run_id.clone()) {
            state.statuses.insert(run_id, status);
        }
    }

    pub fn fail_submissions(&self, error: JobRunnerError) {
        lock(&self.state).submit_failure = Some(error);
    }

    pub fn fail_status_checks(&self, error: JobRunnerError) {
        lock(&self.state).status_failure = Some(error);
    }

    pub fn submitted(&self) -> Vec<SubmittedRun> {
        lock(&self.state).submitted.clone()
    }

    pub fn active_runs(&self) -> usize {
        lock(&self.state)
            .statuses
            .values()
            .filter(|status| !status.is_terminal())
            .count()
    }
}

impl JobRunner for ScriptedJobRunner {
    fn submit(&self, job_name: &str, input_descriptor_uri: &str) -> Result<String, JobRunnerError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.submit_failure.clone() {
            return Err(error);
        }
        if let Some(limit) = self.max_concurrent_runs {
            let active = state
                .statuses
                .values()
                .filter(|status| !status.is_terminal())
                .count();
            if active >= limit {
                return Err(JobRunnerError::ConcurrencyLimitExceeded(format!(
                    "job '{job_name}' already has {active} active run(s)"
                )));
            }
        }

        let run_id = format!("jr_{:04}", state.submitted.len() + 1);
        state.submitted.push(SubmittedRun {
            run_id: run_id.clone(),
            job_name: job_name.to_string(),
            descriptor_uri: input_descriptor_uri.to_string(),
        });
        state
            .statuses
            .insert(run_id.clone(), JobRunStatus::Starting);
        Ok(run_id)
    }

    fn get_status(&self, _job_name: &str, run_id: &str) -> Result<JobRunStatus, JobRunnerError> {
        let state = lock(&self.state);
        if let Some(error) = state.status_failure.clone() {
            return Err(error);
        }
        state
            .statuses
            .get(run_id)
            .copied()
            .ok_or_else(|| JobRunnerError::Other(format!("job run '{run_id}' not found")))
    }
}
