use thiserror::Error;

use crate::domain::{RequestId, RequestStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional overwrite found a different status than the writer
    /// expected. The record was left untouched; the caller decides whether
    /// to retry or refresh.
    #[error("precondition failed for request {request_id}: expected status {expected}, found {actual}")]
    PreconditionFailed {
        request_id: RequestId,
        expected: RequestStatus,
        actual: RequestStatus,
    },
    #[error("request {0} not found")]
    NotFound(RequestId),
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}
