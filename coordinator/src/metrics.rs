//! Metrics collection for coordinator monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Coordinator metrics.
pub struct Metrics {
    /// Total `GetLock` requests.
    pub lock_requests: AtomicU64,
    /// Reservations granted.
    pub locks_granted: AtomicU64,
    /// `GetLock` rejected because the account was locked.
    pub lock_conflicts: AtomicU64,
    /// `GetLock` rejected for insufficient funds.
    pub insufficient_funds: AtomicU64,
    /// Reservations currently pending.
    pub reservations_active: AtomicU64,
    /// Successful commits.
    pub commits: AtomicU64,
    /// Commits that reached the ledger and failed.
    pub commit_failures: AtomicU64,
    /// Reservations resolved by abort.
    pub aborts: AtomicU64,
    /// Reservations aborted by the expiry sweep.
    pub reservations_expired: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            lock_requests: AtomicU64::new(0),
            locks_granted: AtomicU64::new(0),
            lock_conflicts: AtomicU64::new(0),
            insufficient_funds: AtomicU64::new(0),
            reservations_active: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            commit_failures: AtomicU64::new(0),
            aborts: AtomicU64::new(0),
            reservations_expired: AtomicU64::new(0),
        }
    }

    /// Record a `GetLock` request.
    pub fn lock_requested(&self) {
        self.lock_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reservation about to be stored.
    ///
    /// Must run before the reservation is visible, so the decrement from its
    /// resolution can never come first.
    pub fn reservation_opened(&self) {
        self.reservations_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Undo [`reservation_opened`](Self::reservation_opened) for a reservation
    /// the registry refused.
    pub fn reservation_rejected(&self) {
        self.reservations_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a granted reservation.
    pub fn lock_granted(&self) {
        self.locks_granted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lock conflict.
    pub fn lock_conflict(&self) {
        self.lock_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an insufficient funds rejection.
    pub fn insufficient_funds(&self) {
        self.insufficient_funds.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful commit.
    pub fn committed(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.reservations_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a commit whose debit failed.
    pub fn commit_failed(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
        self.reservations_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record an abort that resolved a reservation.
    pub fn aborted(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
        self.reservations_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a reservation aborted by the sweep.
    pub fn expired(&self) {
        self.reservations_expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lock_requests: self.lock_requests.load(Ordering::Relaxed),
            locks_granted: self.locks_granted.load(Ordering::Relaxed),
            lock_conflicts: self.lock_conflicts.load(Ordering::Relaxed),
            insufficient_funds: self.insufficient_funds.load(Ordering::Relaxed),
            reservations_active: self.reservations_active.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            reservations_expired: self.reservations_expired.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP twophase_lock_requests_total Total GetLock requests
# TYPE twophase_lock_requests_total counter
twophase_lock_requests_total {}

# HELP twophase_locks_granted_total Reservations granted
# TYPE twophase_locks_granted_total counter
twophase_locks_granted_total {}

# HELP twophase_lock_conflicts_total GetLock requests rejected by an existing lock
# TYPE twophase_lock_conflicts_total counter
twophase_lock_conflicts_total {}

# HELP twophase_insufficient_funds_total GetLock requests rejected for insufficient funds
# TYPE twophase_insufficient_funds_total counter
twophase_insufficient_funds_total {}

# HELP twophase_reservations_active Reservations awaiting commit or abort
# TYPE twophase_reservations_active gauge
twophase_reservations_active {}

# HELP twophase_commits_total Successful commits
# TYPE twophase_commits_total counter
twophase_commits_total {}

# HELP twophase_commit_failures_total Commits whose ledger debit failed
# TYPE twophase_commit_failures_total counter
twophase_commit_failures_total {}

# HELP twophase_aborts_total Reservations resolved by abort
# TYPE twophase_aborts_total counter
twophase_aborts_total {}

# HELP twophase_reservations_expired_total Reservations aborted after their lease ran out
# TYPE twophase_reservations_expired_total counter
twophase_reservations_expired_total {}
"#,
            snapshot.lock_requests,
            snapshot.locks_granted,
            snapshot.lock_conflicts,
            snapshot.insufficient_funds,
            snapshot.reservations_active,
            snapshot.commits,
            snapshot.commit_failures,
            snapshot.aborts,
            snapshot.reservations_expired,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub lock_requests: u64,
    pub locks_granted: u64,
    pub lock_conflicts: u64,
    pub insufficient_funds: u64,
    pub reservations_active: u64,
    pub commits: u64,
    pub commit_failures: u64,
    pub aborts: u64,
    pub reservations_expired: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
