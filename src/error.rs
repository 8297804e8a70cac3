use thiserror::Error;

use crate::job::JobId;

/// Failure surfaced by a [`ProvingJobStore`](crate::store::ProvingJobStore)
/// operation. The broker does not interpret the message; it only forwards it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Error, Debug)]
pub enum BrokerError {
    /// `enqueue` was called with an id that already maps to a different
    /// record. A caller bug, not a broker fault.
    #[error("job {0} already enqueued with a different record")]
    DuplicateIdConflict(JobId),

    #[error("durable store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
