//! Collaborator implementations backed by AWS services.

pub mod glue;
pub mod s3_objects;
pub mod s3_state_store;
pub mod s3_uri;

use std::future::Future;

/// Drives an SDK future to completion from synchronous collaborator code.
///
/// Requires a multi-threaded tokio runtime on the current thread.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
