use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::job::{JobId, JobOutcome, JobStatus, ProofClass, ProvingJob};
use crate::lease::LeaseTable;
use crate::queue::ClassQueues;
use crate::store::ProvingJobStore;

/// Counts of live broker state, for operator introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerStats {
    pub queued: usize,
    pub leased: usize,
    pub settled: usize,
}

/// Everything the broker mutates, behind one lock. Façade operations take
/// the lock, mutate, and release; only durable-store awaits happen outside
/// the guarded sections.
#[derive(Debug, Default)]
struct BrokerState {
    jobs: HashMap<JobId, ProvingJob>,
    results: HashMap<JobId, JobOutcome>,
    queues: ClassQueues,
    leases: LeaseTable,
    retries: HashMap<JobId, u32>,
    /// Ids whose terminal report has been accepted but whose journal write
    /// is still in flight. Reserving the slot here decides report races
    /// before anything reaches the store.
    settling: HashSet<JobId>,
}

impl BrokerState {
    /// Pop the best job across `allow` (by class rank, then epoch, then
    /// FIFO) and lease it. Tombstone entries left behind by cancellation,
    /// out-of-band settlement, or a duplicate retry report are skipped.
    fn dispatch(&mut self, allow: &[ProofClass], now: Instant) -> Option<ProvingJob> {
        let mut classes = allow.to_vec();
        classes.sort_by_key(|class| class.dispatch_rank());
        classes.dedup();

        for class in classes {
            while let Some(id) = self.queues.pop(class) {
                if self.results.contains_key(&id)
                    || self.leases.contains(&id)
                    || self.settling.contains(&id)
                {
                    continue;
                }
                let Some(job) = self.jobs.get(&id) else {
                    continue;
                };
                // A cancelled job's entry outlives it; if its id was reused
                // for a job of another class, this entry is not the one
                // that queued the current job.
                if job.class != class {
                    continue;
                }
                let job = job.clone();
                self.leases.install(id, now);
                return Some(job);
            }
        }
        None
    }
}

struct Inner<S> {
    store: S,
    config: BrokerConfig,
    state: RwLock<BrokerState>,
    shutdown: CancellationToken,
}

/// Central coordinator for proof-generation work.
///
/// Producers [`enqueue`](Self::enqueue) jobs; workers poll with
/// [`acquire`](Self::acquire), keep their lease alive with
/// [`heartbeat`](Self::heartbeat), and finalize with
/// [`report_success`](Self::report_success) or
/// [`report_failure`](Self::report_failure). A background sweeper requeues
/// jobs whose lease heartbeat has gone stale. Terminal outcomes are
/// journaled through the store before they become observable, so a restart
/// recovers every settled and pending job.
///
/// Cloning is cheap; clones share all state.
pub struct ProvingBroker<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for ProvingBroker<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: ProvingJobStore> ProvingBroker<S> {
    /// Recover state from the store and start the timeout sweeper.
    pub async fn start(store: S, config: BrokerConfig) -> Result<Self> {
        let mut state = BrokerState::default();
        let records = store.iterate_all().await?;

        let mut settled = 0usize;
        let mut queued = 0usize;
        for (job, outcome) in records {
            match outcome {
                Some(outcome) => {
                    state.results.insert(job.id.clone(), outcome);
                    settled += 1;
                }
                None => {
                    state.queues.push(job.class, job.epoch, job.id.clone());
                    queued += 1;
                }
            }
            state.jobs.insert(job.id.clone(), job);
        }
        tracing::info!(settled, queued, "Broker recovered journal");

        let inner = Arc::new(Inner {
            store,
            config,
            state: RwLock::new(state),
            shutdown: CancellationToken::new(),
        });
        Self::spawn_sweeper(&inner);

        Ok(Self { inner })
    }

    /// Admit a job: journal it, index it, queue it. Idempotent for a
    /// byte-equal resubmission; a different record under the same id is
    /// rejected with [`DuplicateIdConflict`](crate::BrokerError::DuplicateIdConflict).
    pub async fn enqueue(&self, job: ProvingJob) -> Result<()> {
        {
            let state = self.inner.state.read().await;
            if let Some(existing) = state.jobs.get(&job.id) {
                return Self::check_duplicate(existing, &job);
            }
        }

        // Journal before any in-memory mutation; a store failure leaves the
        // broker exactly as it was.
        self.inner.store.add_job(&job).await?;

        let mut state = self.inner.state.write().await;
        if let Some(existing) = state.jobs.get(&job.id) {
            return Self::check_duplicate(existing, &job);
        }
        tracing::info!(
            job_id = %job.id,
            class = %job.class,
            epoch = job.epoch,
            "Job enqueued"
        );
        state.queues.push(job.class, job.epoch, job.id.clone());
        state.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn check_duplicate(existing: &ProvingJob, submitted: &ProvingJob) -> Result<()> {
        if existing == submitted {
            tracing::debug!(job_id = %submitted.id, "Duplicate enqueue ignored");
            Ok(())
        } else {
            Err(BrokerError::DuplicateIdConflict(submitted.id.clone()))
        }
    }

    /// Remove a job unconditionally: journal entry, indices, lease, retry
    /// count. Reports that arrive for it afterwards are dropped. Unknown
    /// ids are a no-op.
    pub async fn cancel(&self, id: &JobId) -> Result<()> {
        let known = {
            let mut state = self.inner.state.write().await;
            let known = state.jobs.remove(id).is_some();
            state.results.remove(id);
            state.leases.remove(id);
            state.retries.remove(id);
            // Dropping the reservation tells an in-flight settlement it
            // lost; the settler rolls its journal write back.
            state.settling.remove(id);
            // The queue entry, if any, stays behind as a tombstone and is
            // skipped at dispatch.
            known
        };
        if known {
            tracing::info!(job_id = %id, "Job cancelled");
            self.inner.store.delete_job_and_result(id).await?;
        }
        Ok(())
    }

    pub async fn status(&self, id: &JobId) -> JobStatus {
        let state = self.inner.state.read().await;
        if !state.jobs.contains_key(id) {
            return JobStatus::NotFound;
        }
        match state.results.get(id) {
            Some(JobOutcome::Success { value }) => JobStatus::Resolved {
                value: value.clone(),
            },
            Some(JobOutcome::Failure { reason }) => JobStatus::Rejected {
                reason: reason.clone(),
            },
            None if state.leases.contains(id) => JobStatus::InProgress,
            None => JobStatus::Queued,
        }
    }

    /// Hand out the best queued job among `allow`, leasing it to the
    /// caller. Returns `None` when every allowed queue is empty. Never
    /// blocks; long-poll semantics belong to the transport.
    pub async fn acquire(&self, allow: &[ProofClass]) -> Option<ProvingJob> {
        let mut state = self.inner.state.write().await;
        let job = state.dispatch(allow, Instant::now())?;
        tracing::info!(
            job_id = %job.id,
            class = %job.class,
            epoch = job.epoch,
            "Job leased"
        );
        Some(job)
    }

    /// Extend the caller's lease on `id`. If the lease is gone (reclaimed,
    /// settled, or cancelled) and `reassign` is given, the caller is
    /// treated as idle and gets the next job from those classes instead;
    /// without `reassign` the caller should abandon the work.
    pub async fn heartbeat(
        &self,
        id: &JobId,
        reassign: Option<&[ProofClass]>,
    ) -> Option<ProvingJob> {
        let mut state = self.inner.state.write().await;
        let now = Instant::now();
        if state.leases.touch(id, now) {
            tracing::debug!(job_id = %id, "Heartbeat");
            return None;
        }
        let allow = reassign?;
        tracing::debug!(job_id = %id, "Heartbeat for reclaimed lease, redispatching");
        let job = state.dispatch(allow, now)?;
        tracing::info!(
            job_id = %job.id,
            class = %job.class,
            epoch = job.epoch,
            "Job leased"
        );
        Some(job)
    }

    /// Record a proof for `id`. First report wins; reports for unknown or
    /// already-settled jobs are dropped.
    pub async fn report_success(&self, id: &JobId, value: Vec<u8>) -> Result<()> {
        {
            let mut state = self.inner.state.write().await;
            if !Self::clear_lease_for_report(&mut state, id, "success") {
                return Ok(());
            }
            state.settling.insert(id.clone());
        }
        self.settle(id, JobOutcome::Success { value }).await
    }

    /// Record a failure for `id`. With `retry` set and budget remaining the
    /// job goes back on its queue instead of settling; the journal is not
    /// touched for that non-terminal path.
    pub async fn report_failure(&self, id: &JobId, reason: &str, retry: bool) -> Result<()> {
        let exhausted = {
            let mut state = self.inner.state.write().await;
            if !Self::clear_lease_for_report(&mut state, id, "failure") {
                return Ok(());
            }

            let attempts = state.retries.get(id).copied().unwrap_or(0);
            if retry && attempts + 1 < self.inner.config.max_retries {
                if let Some((class, epoch)) = state.jobs.get(id).map(|job| (job.class, job.epoch)) {
                    state.retries.insert(id.clone(), attempts + 1);
                    state.queues.push(class, epoch, id.clone());
                    tracing::info!(
                        job_id = %id,
                        attempt = attempts + 1,
                        reason,
                        "Job failed, requeued for retry"
                    );
                    return Ok(());
                }
            }
            state.settling.insert(id.clone());
            retry
        };

        let reason = if exhausted {
            format!("retries exhausted: {reason}")
        } else {
            reason.to_string()
        };
        self.settle(id, JobOutcome::Failure { reason }).await
    }

    /// Shared pre-settlement bookkeeping: drop the caller's lease and
    /// decide whether the report should be honored. A report loses if the
    /// job is unknown, already settled, or another report has already
    /// reserved the settlement slot.
    fn clear_lease_for_report(state: &mut BrokerState, id: &JobId, kind: &str) -> bool {
        if !state.jobs.contains_key(id) {
            tracing::warn!(job_id = %id, kind, "Report for unknown job dropped");
            return false;
        }
        state.leases.remove(id);
        if state.results.contains_key(id) {
            tracing::warn!(job_id = %id, kind, "Report for settled job dropped");
            return false;
        }
        if state.settling.contains(id) {
            tracing::warn!(job_id = %id, kind, "Report raced a settlement in flight, dropped");
            return false;
        }
        true
    }

    /// Journal `outcome`, then install it. The caller reserved the
    /// settlement slot under the lock, so no competing report reaches the
    /// store; only a concurrent cancel can still invalidate the write.
    async fn settle(&self, id: &JobId, outcome: JobOutcome) -> Result<()> {
        if let Err(e) = self.inner.store.set_result(id, &outcome).await {
            // Release the reservation so the worker can retry the report
            // once the store is back.
            let mut state = self.inner.state.write().await;
            state.settling.remove(id);
            if !state.jobs.contains_key(id) {
                // The job was cancelled while the write was in flight;
                // nothing reached the journal and the report is moot.
                tracing::warn!(job_id = %id, "Job cancelled during settlement, report dropped");
                return Ok(());
            }
            return Err(e.into());
        }

        let rollback = {
            let mut state = self.inner.state.write().await;
            let reserved = state.settling.remove(id);
            if reserved && state.jobs.contains_key(id) {
                tracing::info!(job_id = %id, outcome = outcome_kind(&outcome), "Job settled");
                state.results.insert(id.clone(), outcome);
                false
            } else {
                // Cancel cleared the reservation while the write was in
                // flight. Scrub the journal unless a new job has already
                // been admitted under the id.
                !state.jobs.contains_key(id)
            }
        };

        if rollback {
            tracing::warn!(job_id = %id, "Job cancelled during settlement, rolling back journal");
            if let Err(e) = self.inner.store.delete_job_and_result(id).await {
                tracing::warn!(job_id = %id, error = %e, "Rollback of cancelled settlement failed");
            }
        }
        Ok(())
    }

    /// One sweeper pass: requeue every job whose lease heartbeat is at
    /// least `job_timeout` old. Timed-out dispatches do not consume retry
    /// budget. Public so tests (and embedders with their own scheduling)
    /// can drive reclamation directly.
    pub async fn reclaim_expired(&self) {
        let now = Instant::now();
        let mut state = self.inner.state.write().await;
        for id in state.leases.expired(now, self.inner.config.job_timeout) {
            state.leases.remove(&id);
            match state.jobs.get(&id).map(|job| (job.class, job.epoch)) {
                Some((class, epoch)) => {
                    tracing::warn!(job_id = %id, class = %class, "Lease expired, job requeued");
                    state.queues.push(class, epoch, id);
                }
                None => {
                    tracing::debug!(job_id = %id, "Dropped lease for cancelled job");
                }
            }
        }
    }

    pub async fn stats(&self) -> BrokerStats {
        let state = self.inner.state.read().await;
        BrokerStats {
            queued: state.jobs.len() - state.leases.len() - state.results.len(),
            leased: state.leases.len(),
            settled: state.results.len(),
        }
    }

    /// Stop the background sweeper. The façade keeps working; only
    /// automatic lease reclamation ceases.
    pub fn stop(&self) {
        self.inner.shutdown.cancel();
    }

    /// The store this broker journals through.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    fn spawn_sweeper(inner: &Arc<Inner<S>>) {
        let weak = Arc::downgrade(inner);
        let shutdown = inner.shutdown.clone();
        let period = inner.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately; skip it so the first
            // real pass happens one full period after startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = weak.upgrade() else { break };
                let broker = ProvingBroker { inner };
                broker.reclaim_expired().await;
            }
        });
    }
}

fn outcome_kind(outcome: &JobOutcome) -> &'static str {
    match outcome {
        JobOutcome::Success { .. } => "success",
        JobOutcome::Failure { .. } => "failure",
    }
}
