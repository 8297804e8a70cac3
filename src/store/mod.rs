//! Durable-store contract the broker persists through.
//!
//! The broker owns all access to the store: it appends jobs on admission,
//! records terminal outcomes on settlement, deletes on cancellation, and
//! enumerates everything once at startup. Leases and retry counts are
//! volatile and deliberately not persisted.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::job::{JobId, JobOutcome, ProvingJob};

pub mod memory;

pub use memory::InMemoryJobStore;

#[async_trait]
pub trait ProvingJobStore: Send + Sync + 'static {
    /// Persist a job record. Idempotent: re-adding an identical record is
    /// a no-op.
    async fn add_job(&self, job: &ProvingJob) -> Result<(), StoreError>;

    /// Persist the terminal outcome for a job.
    async fn set_result(&self, id: &JobId, outcome: &JobOutcome) -> Result<(), StoreError>;

    /// Remove a job record and its outcome, if any.
    async fn delete_job_and_result(&self, id: &JobId) -> Result<(), StoreError>;

    /// Enumerate every persisted job with its outcome. Called once, at
    /// broker startup.
    async fn iterate_all(&self) -> Result<Vec<(ProvingJob, Option<JobOutcome>)>, StoreError>;
}
