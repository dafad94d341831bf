use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const SCHEME: &str = "s3://";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid s3 uri `{value}`: {reason}")]
pub struct InvalidS3Uri {
    value: String,
    reason: &'static str,
}

/// A bucket plus an optional key or key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

impl S3Uri {
    pub fn parse(value: &str) -> Result<Self, InvalidS3Uri> {
        let invalid = |reason| InvalidS3Uri {
            value: value.to_string(),
            reason,
        };
        let rest = value
            .trim()
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("expected the s3:// scheme"))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(invalid("bucket cannot be empty"));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Parses a URI that must name a single object.
    pub fn parse_object(value: &str) -> Result<Self, InvalidS3Uri> {
        let uri = Self::parse(value)?;
        if uri.key.is_empty() || uri.key.ends_with('/') {
            return Err(InvalidS3Uri {
                value: value.to_string(),
                reason: "expected an object key",
            });
        }
        Ok(uri)
    }

    pub fn object(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/{}", self.bucket, self.key)
    }
}

impl FromStr for S3Uri {
    type Err = InvalidS3Uri;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}
