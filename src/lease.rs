use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::job::JobId;

/// Record that some worker is currently holding a job, bounded by a
/// heartbeat deadline.
#[derive(Debug, Clone)]
pub struct Lease {
    pub started_at: Instant,
    pub last_heartbeat_at: Instant,
}

impl Lease {
    fn new(now: Instant) -> Self {
        Self {
            started_at: now,
            last_heartbeat_at: now,
        }
    }

    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.duration_since(self.last_heartbeat_at) >= timeout
    }
}

/// Leases for all currently dispatched jobs, keyed by job id.
#[derive(Debug, Default)]
pub struct LeaseTable {
    leases: HashMap<JobId, Lease>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, id: JobId, now: Instant) {
        self.leases.insert(id, Lease::new(now));
    }

    /// Refresh the heartbeat stamp. Returns false if no lease is held,
    /// meaning the job was reclaimed or settled under the worker.
    pub fn touch(&mut self, id: &JobId, now: Instant) -> bool {
        match self.leases.get_mut(id) {
            Some(lease) => {
                lease.last_heartbeat_at = now;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &JobId) -> Option<Lease> {
        self.leases.remove(id)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.leases.contains_key(id)
    }

    /// Ids whose last heartbeat is at least `timeout` old.
    pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<JobId> {
        self.leases
            .iter()
            .filter(|(_, lease)| lease.is_expired(now, timeout))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }
}
