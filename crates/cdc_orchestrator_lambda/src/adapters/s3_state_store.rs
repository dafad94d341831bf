use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::ByteStream;
use cdc_orchestrator_core::ports::{StateStore, StoreError, VersionedBlob, WritePrecondition};

use super::block_on;

/// Tracker state persisted as a single S3 object; the ETag is the version
/// token and writes use `If-Match` / `If-None-Match`.
#[derive(Clone)]
pub struct S3StateStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3StateStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

impl StateStore for S3StateStore {
    fn read(&self, key: &str) -> Result<VersionedBlob, StoreError> {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let object_key = key.to_string();

        block_on(async move {
            let output = client
                .get_object()
                .bucket(bucket)
                .key(object_key)
                .send()
                .await
                .map_err(|error| match error.as_service_error() {
                    Some(service_error) if service_error.is_no_such_key() => StoreError::NotFound,
                    _ => StoreError::Other(format!(
                        "failed to read tracker state from s3: {}",
                        DisplayErrorContext(&error)
                    )),
                })?;
            let version = output
                .e_tag()
                .map(str::to_string)
                .ok_or_else(|| {
                    StoreError::Other("s3 returned tracker state without an etag".to_string())
                })?;
            let body = output
                .body
                .collect()
                .await
                .map_err(|error| {
                    StoreError::Other(format!("failed to read tracker body: {error}"))
                })?
                .into_bytes()
                .to_vec();
            Ok(VersionedBlob { body, version })
        })
    }

    fn write(
        &self,
        key: &str,
        body: &[u8],
        precondition: WritePrecondition,
    ) -> Result<String, StoreError> {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let object_key = key.to_string();
        let body_bytes = body.to_vec();

        block_on(async move {
            let request = client
                .put_object()
                .bucket(bucket)
                .key(object_key)
                .content_type("application/json")
                .body(ByteStream::from(body_bytes));
            let request = match precondition {
                WritePrecondition::DoesNotExist => request.if_none_match("*"),
                WritePrecondition::MatchesVersion(version) => request.if_match(version),
            };
            let output = request.send().await.map_err(|error| {
                if is_precondition_failure(&error) {
                    StoreError::PreconditionFailed
                } else {
                    StoreError::Other(format!(
                        "failed to write tracker state to s3: {}",
                        DisplayErrorContext(&error)
                    ))
                }
            })?;
            output
                .e_tag()
                .map(str::to_string)
                .ok_or_else(|| {
                    StoreError::Other("s3 accepted tracker state without an etag".to_string())
                })
        })
    }
}

/// S3 answers 412 when the condition does not hold and 409 when a
/// concurrent conditional write to the same key won the race.
fn is_precondition_failure(error: &SdkError<PutObjectError, HttpResponse>) -> bool {
    error
        .raw_response()
        .map(|response| is_precondition_status(response.status().as_u16()))
        .unwrap_or(false)
}

fn is_precondition_status(status: u16) -> bool {
    matches!(status, 409 | 412)
}
