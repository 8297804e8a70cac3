use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::job::{JobId, JobOutcome, ProvingJob};
use crate::store::ProvingJobStore;

/// Reference store implementation backed by a process-local map.
///
/// Useful for tests and single-process deployments where the journal does
/// not need to survive a restart. Production deployments plug in a store
/// that writes through to disk.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    records: Mutex<HashMap<JobId, (ProvingJob, Option<JobOutcome>)>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, as a prior broker run would have left it.
    pub fn seed(&self, job: ProvingJob, outcome: Option<JobOutcome>) {
        let mut records = self.records.lock().expect("store mutex poisoned");
        records.insert(job.id.clone(), (job, outcome));
    }

    /// Read back a record, outcome included.
    pub fn get(&self, id: &JobId) -> Option<(ProvingJob, Option<JobOutcome>)> {
        let records = self.records.lock().expect("store mutex poisoned");
        records.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProvingJobStore for InMemoryJobStore {
    async fn add_job(&self, job: &ProvingJob) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        records
            .entry(job.id.clone())
            .or_insert_with(|| (job.clone(), None));
        Ok(())
    }

    async fn set_result(&self, id: &JobId, outcome: &JobOutcome) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        match records.get_mut(id) {
            Some((_, slot)) => {
                *slot = Some(outcome.clone());
                Ok(())
            }
            None => Err(StoreError::new(format!("no job record for {id}"))),
        }
    }

    async fn delete_job_and_result(&self, id: &JobId) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        records.remove(id);
        Ok(())
    }

    async fn iterate_all(&self) -> Result<Vec<(ProvingJob, Option<JobOutcome>)>, StoreError> {
        let records = self.records.lock().expect("store mutex poisoned");
        Ok(records.values().cloned().collect())
    }
}
