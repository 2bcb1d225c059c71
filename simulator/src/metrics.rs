//! Simulation metrics.

use std::collections::VecDeque;

/// Simulation metrics.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    /// Total transfers attempted.
    pub total_transfers: u64,
    /// Transfers reserved and committed.
    pub committed: u64,
    /// Transfers reserved and then aborted by the client.
    pub aborted: u64,
    /// Reservations refused because the account was locked.
    pub conflicts: u64,
    /// Transfers that failed for any other reason.
    pub failed: u64,
    /// Sum of committed amounts.
    pub committed_amount: i64,
    /// Latency samples (ms).
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_transfers: 0,
            committed: 0,
            aborted: 0,
            conflicts: 0,
            failed: 0,
            committed_amount: 0,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record a committed transfer.
    pub fn record_commit(&mut self, amount: i64, latency_ms: u64) {
        self.total_transfers += 1;
        self.committed += 1;
        self.committed_amount += amount;
        self.push_latency(latency_ms);
    }

    /// Record a transfer the client chose to abort.
    pub fn record_abort(&mut self, latency_ms: u64) {
        self.total_transfers += 1;
        self.aborted += 1;
        self.push_latency(latency_ms);
    }

    /// Record a lock conflict.
    pub fn record_conflict(&mut self) {
        self.total_transfers += 1;
        self.conflicts += 1;
    }

    /// Record a failed transfer.
    pub fn record_failure(&mut self) {
        self.total_transfers += 1;
        self.failed += 1;
    }

    fn push_latency(&mut self, latency_ms: u64) {
        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_ms);
    }

    /// Get average latency in ms.
    pub fn average_latency_ms(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p99 latency.
    pub fn p99_latency_ms(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Get the share of attempts that committed.
    pub fn success_rate(&self) -> f64 {
        if self.total_transfers == 0 {
            return 0.0;
        }

        self.committed as f64 / self.total_transfers as f64
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
