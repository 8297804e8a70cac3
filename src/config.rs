use std::time::Duration;

/// Broker tuning knobs. All fields have working defaults; override with the
/// builder-style setters.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// A lease expires once this long has passed since the last heartbeat.
    pub job_timeout: Duration,
    /// How often the sweeper scans for expired leases. Keep this at or
    /// below half of `job_timeout` so reclamation latency stays bounded.
    pub sweep_interval: Duration,
    /// Total dispatches permitted when every prior dispatch reported a
    /// retryable failure. The `max_retries`-th failure is terminal.
    pub max_retries: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

impl BrokerConfig {
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}
