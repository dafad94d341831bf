use std::collections::VecDeque;

use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use cdc_orchestrator_core::ports::{
    DescriptorSink, ListError, ObjectDescriptor, ObjectIter, ObjectLister, SinkError,
};

use super::block_on;
use super::s3_uri::S3Uri;

/// Lists stream objects in one bucket with `ListObjectsV2`.
#[derive(Clone)]
pub struct S3ObjectLister {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectLister {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

impl ObjectLister for S3ObjectLister {
    fn list<'a>(&'a self, prefix: &str, start_after_key: &str) -> ObjectIter<'a> {
        Box::new(S3Listing {
            lister: self,
            prefix: prefix.to_string(),
            start_after: start_after_key.to_string(),
            continuation_token: None,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }
}

/// Walks `ListObjectsV2` pages on demand so a consumer that stops early
/// never pays for the rest of the listing.
struct S3Listing<'a> {
    lister: &'a S3ObjectLister,
    prefix: String,
    start_after: String,
    continuation_token: Option<String>,
    buffer: VecDeque<ObjectDescriptor>,
    exhausted: bool,
}

impl S3Listing<'_> {
    fn fetch_page(&mut self) -> Result<(), ListError> {
        let client = self.lister.client.clone();
        let bucket = self.lister.bucket.clone();
        let request = client
            .list_objects_v2()
            .bucket(&bucket)
            .prefix(&self.prefix)
            .set_continuation_token(self.continuation_token.clone());
        // S3 ignores StartAfter once a continuation token is present.
        let request = if self.continuation_token.is_none() && !self.start_after.is_empty() {
            request.start_after(&self.start_after)
        } else {
            request
        };

        let output = block_on(request.send()).map_err(|error| {
            ListError::Other(format!(
                "failed to list s3://{bucket}/{}: {}",
                self.prefix,
                DisplayErrorContext(&error)
            ))
        })?;

        for object in output.contents() {
            if let Some(key) = object.key() {
                self.buffer.push_back(ObjectDescriptor {
                    key: key.to_string(),
                    uri: S3Uri::object(bucket.as_str(), key).to_string(),
                });
            }
        }
        self.continuation_token = output.next_continuation_token().map(str::to_string);
        self.exhausted =
            !output.is_truncated().unwrap_or(false) || self.continuation_token.is_none();
        Ok(())
    }
}

impl Iterator for S3Listing<'_> {
    type Item = Result<ObjectDescriptor, ListError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.is_empty() && !self.exhausted {
            if let Err(error) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(error));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Writes job input descriptors to whatever bucket their URI names.
#[derive(Clone)]
pub struct S3DescriptorSink {
    client: aws_sdk_s3::Client,
}

impl S3DescriptorSink {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

impl DescriptorSink for S3DescriptorSink {
    fn write_descriptor(&self, uri: &str, json_payload: &[u8]) -> Result<(), SinkError> {
        let target =
            S3Uri::parse_object(uri).map_err(|error| SinkError::Other(error.to_string()))?;
        let client = self.client.clone();
        let body_bytes = json_payload.to_vec();

        block_on(async move {
            client
                .put_object()
                .bucket(target.bucket)
                .key(target.key)
                .content_type("application/json")
                .body(ByteStream::from(body_bytes))
                .send()
                .await
                .map(|_| ())
                .map_err(|error| {
                    SinkError::Other(format!(
                        "failed to write job input descriptor to s3: {}",
                        DisplayErrorContext(&error)
                    ))
                })
        })
    }
}
