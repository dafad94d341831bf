//! AWS console links for operators following a tracker by hand.

use crate::adapters::s3_uri::S3Uri;

pub fn glue_job_runs_url(region: &str, job_name: &str) -> String {
    format!(
        "https://{region}.console.aws.amazon.com/gluestudio/home?region={region}#/editor/job/{job_name}/runs"
    )
}

pub fn glue_job_run_url(region: &str, job_name: &str, run_id: &str) -> String {
    format!(
        "https://{region}.console.aws.amazon.com/gluestudio/home?region={region}#/job/{job_name}/run/{run_id}"
    )
}

pub fn s3_object_url(region: &str, uri: &S3Uri) -> String {
    format!(
        "https://{region}.console.aws.amazon.com/s3/object/{}?region={region}&prefix={}",
        uri.bucket, uri.key
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_region_scoped_links() {
        assert_eq!(
            glue_job_runs_url("eu-west-1", "app_incremental"),
            "https://eu-west-1.console.aws.amazon.com/gluestudio/home?region=eu-west-1#/editor/job/app_incremental/runs"
        );
        assert!(glue_job_run_url("eu-west-1", "app_incremental", "jr_1").ends_with("/run/jr_1"));
        let tracker = S3Uri::object("lake-data", "projects/app/tracker.json");
        assert_eq!(
            s3_object_url("us-east-1", &tracker),
            "https://us-east-1.console.aws.amazon.com/s3/object/lake-data?region=us-east-1&prefix=projects/app/tracker.json"
        );
    }
}
