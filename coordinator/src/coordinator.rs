//! Core coordinator implementation.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};

use twophase_common::{
    from_std, now, AccountId, Amount, PendingTransaction, Result, Timestamp, TransactionId,
    TransferError,
};
use twophase_ledger::{LedgerClient, LedgerError};

use crate::config::CoordinatorConfig;
use crate::lock_table::LockTable;
use crate::metrics::{Metrics, SharedMetrics};
use crate::registry::PendingRegistry;
use crate::state::CoordinatorState;

/// The two-phase commit coordinator.
///
/// `get_lock` reserves an amount on an account, and exactly one of `commit`
/// or `abort` later resolves the reservation. The coordinator is the only
/// component touching both the lock table and the pending registry, which
/// keeps "account locked" and "reservation pending" in step.
pub struct Coordinator {
    /// Configuration.
    config: CoordinatorConfig,
    /// Node ID for this coordinator instance.
    node_id: String,
    /// Current coordinator state.
    state: Arc<RwLock<CoordinatorState>>,
    /// Ledger holding the balances.
    ledger: Arc<dyn LedgerClient>,
    /// Account locks.
    locks: Arc<LockTable>,
    /// Reservations awaiting resolution.
    registry: Arc<PendingRegistry>,
    /// Per-account critical sections for `get_lock`, present only while held
    /// or awaited.
    gates: DashMap<AccountId, Arc<Mutex<()>>>,
    /// Metrics.
    metrics: SharedMetrics,
    /// Shutdown signal for background tasks.
    shutdown_tx: watch::Sender<bool>,
}

impl Coordinator {
    /// Create a new coordinator instance.
    pub fn new(config: CoordinatorConfig, node_id: String, ledger: Arc<dyn LedgerClient>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            node_id,
            state: Arc::new(RwLock::new(CoordinatorState::Starting)),
            ledger,
            locks: Arc::new(LockTable::new()),
            registry: Arc::new(PendingRegistry::new()),
            gates: DashMap::new(),
            metrics: Arc::new(Metrics::new()),
            shutdown_tx,
        }
    }

    /// Start the coordinator and its expiry sweep.
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        info!(node_id = %self.node_id, ledger = self.ledger.name(), "Starting coordinator");

        *self.state.write() = CoordinatorState::Running;

        if self.config.lock_config.reservation_ttl.is_some() {
            let coordinator = Arc::clone(self);
            let shutdown_rx = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                coordinator.run_sweep_loop(shutdown_rx).await;
            });
        }

        info!(node_id = %self.node_id, "Coordinator started successfully");
        Ok(())
    }

    /// Stop accepting reservations and wait for pending ones to resolve.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        if self.state().is_terminal() {
            debug!(node_id = %self.node_id, "Coordinator already stopped");
            return Ok(());
        }

        info!(node_id = %self.node_id, "Stopping coordinator");

        *self.state.write() = CoordinatorState::ShuttingDown;

        // The sweep keeps running while draining so expiring leases resolve.
        self.drain_pending().await;

        let _ = self.shutdown_tx.send(true);

        *self.state.write() = CoordinatorState::Stopped;

        let abandoned = self.registry.len();
        if abandoned > 0 {
            warn!(
                node_id = %self.node_id,
                abandoned,
                "Coordinator stopped with unresolved reservations"
            );
        }

        info!(node_id = %self.node_id, "Coordinator stopped");
        Ok(())
    }

    /// Prepare phase: lock `account` and reserve `amount` for `transaction_id`.
    ///
    /// The lock check, the balance lookup and the lock acquisition run in
    /// one critical section per account, so two concurrent calls for the
    /// same account can never both pass the balance check.
    #[instrument(skip(self), fields(transaction_id = %transaction_id, account = %account))]
    pub async fn get_lock(
        &self,
        transaction_id: TransactionId,
        account: AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.metrics.lock_requested();

        if !self.state().accepts_reservations() {
            return Err(TransferError::CoordinatorUnavailable(format!(
                "node {} is {:?}",
                self.node_id,
                self.state()
            )));
        }

        if amount <= 0 {
            return Err(TransferError::InvalidAmount(amount));
        }

        let _gate = self.enter_gate(account).await;

        if self.locks.is_locked(account) {
            self.metrics.lock_conflict();
            warn!("Account already locked");
            return Err(TransferError::LockConflict(account));
        }

        let balance = match self.ledger.check_balance(account).await {
            Ok(balance) => balance,
            Err(LedgerError::NotFound(_)) => {
                debug!("Account not found, treating balance as zero");
                0
            }
            Err(e) => {
                error!(error = %e, "Balance check failed");
                return Err(TransferError::LedgerUnavailable(e.to_string()));
            }
        };

        if balance < amount {
            self.metrics.insufficient_funds();
            warn!(balance, amount, "Insufficient funds");
            return Err(TransferError::InsufficientFunds {
                account,
                required: amount,
            });
        }

        if !self.locks.try_acquire(account) {
            self.metrics.lock_conflict();
            warn!("Lost lock race");
            return Err(TransferError::LockConflict(account));
        }

        let mut pending = PendingTransaction::new(transaction_id, account, amount);
        if let Some(ttl) = self.config.lock_config.reservation_ttl {
            pending = pending.with_lease(from_std(ttl));
        }

        // Counted before the reservation becomes visible to commit and abort.
        self.metrics.reservation_opened();
        if let Err(e) = self.registry.reserve(pending) {
            self.metrics.reservation_rejected();
            self.locks.release(account);
            warn!(error = %e, "Reservation rejected");
            return Err(e);
        }

        self.metrics.lock_granted();
        info!(amount, "Lock granted");
        Ok(())
    }

    /// Commit phase: debit the reserved amount and unlock the account.
    ///
    /// The reservation is consumed before the debit. If the debit fails the
    /// lock is still released and the failure reported; it is never retried.
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn commit(&self, transaction_id: TransactionId) -> Result<()> {
        let pending = match self.registry.take(transaction_id) {
            Some(pending) => pending,
            None => {
                warn!("Commit for unknown payment");
                return Err(TransferError::PaymentNotFound(transaction_id));
            }
        };

        let account = pending.account_id;
        let outcome = self.ledger.debit(account, pending.amount).await;
        self.locks.release(account);

        match outcome {
            Ok(()) => {
                self.metrics.committed();
                info!(account = %account, amount = pending.amount, "Committed");
                Ok(())
            }
            Err(LedgerError::Unmodified(_)) => {
                self.metrics.commit_failed();
                error!(
                    account = %account,
                    amount = pending.amount,
                    "Debit matched no record at commit"
                );
                Err(TransferError::InsufficientFunds {
                    account,
                    required: pending.amount,
                })
            }
            Err(e) => {
                self.metrics.commit_failed();
                error!(
                    account = %account,
                    amount = pending.amount,
                    error = %e,
                    "Debit failed after reservation was consumed; ledger state unknown"
                );
                Err(TransferError::LedgerUnavailable(e.to_string()))
            }
        }
    }

    /// Abort phase: drop the reservation and unlock the account.
    ///
    /// Aborting an unknown or already resolved transaction succeeds.
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn abort(&self, transaction_id: TransactionId) -> Result<()> {
        match self.registry.take(transaction_id) {
            Some(pending) => {
                self.release_aborted(&pending);
                info!(account = %pending.account_id, "Aborted");
            }
            None => debug!("Abort for unknown payment"),
        }
        Ok(())
    }

    /// Abort every reservation whose lease has run out. Returns how many.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(now())
    }

    /// Abort every reservation whose lease has run out at `at`.
    pub fn sweep_expired_at(&self, at: Timestamp) -> usize {
        let mut swept = 0;

        for transaction_id in self.registry.expired(at) {
            if let Some(pending) = self.registry.take_expired(transaction_id, at) {
                self.release_aborted(&pending);
                self.metrics.expired();
                warn!(
                    transaction_id = %transaction_id,
                    account = %pending.account_id,
                    reserved_at = %pending.reserved_at,
                    "Reservation expired, aborted"
                );
                swept += 1;
            }
        }

        swept
    }

    /// Check if an account is locked.
    pub fn is_locked(&self, account: AccountId) -> bool {
        self.locks.is_locked(account)
    }

    /// Get a pending reservation.
    pub fn pending(&self, transaction_id: TransactionId) -> Option<PendingTransaction> {
        self.registry.get(transaction_id)
    }

    /// Get the number of pending reservations.
    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    /// Get the number of locked accounts.
    pub fn locked_count(&self) -> usize {
        self.locks.locked_count()
    }

    /// Get the current coordinator state.
    pub fn state(&self) -> CoordinatorState {
        *self.state.read()
    }

    /// Get the node ID.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Get the shared metrics.
    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    // --- Private methods ---

    async fn enter_gate(&self, account: AccountId) -> AccountGate<'_> {
        // Declared before the mutex handle so a cancelled wait still cleans up.
        let mut entered = AccountGate {
            gates: &self.gates,
            account,
            guard: None,
        };

        let gate = self
            .gates
            .entry(account)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        entered.guard = Some(gate.lock_owned().await);
        entered
    }

    fn release_aborted(&self, pending: &PendingTransaction) {
        self.locks.release(pending.account_id);
        self.metrics.aborted();
    }

    async fn run_sweep_loop(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.lock_config.sweep_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let swept = self.sweep_expired();
                    if swept > 0 {
                        info!(swept, "Expired reservations swept");
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }

        debug!("Sweep loop stopped");
    }

    async fn drain_pending(&self) {
        use tokio::time::{timeout, Duration};

        let _ = timeout(self.config.shutdown_grace, async {
            loop {
                let pending_count = self.registry.len();
                if pending_count == 0 {
                    break;
                }
                info!(pending_count, "Waiting for pending reservations to resolve");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;
    }
}

/// Holds an account's `get_lock` critical section.
///
/// Dropping it releases the section and removes the gate from the map once
/// no other caller holds or waits on it.
struct AccountGate<'a> {
    gates: &'a DashMap<AccountId, Arc<Mutex<()>>>,
    account: AccountId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AccountGate<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.gates
            .remove_if(&self.account, |_, gate| Arc::strong_count(gate) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use twophase_ledger::InMemoryLedger;

    fn create_test_coordinator() -> (Arc<Coordinator>, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::with_accounts([
            (AccountId::new(1), 100),
            (AccountId::new(2), 5),
        ]));
        let mut config = CoordinatorConfig::default();
        config.shutdown_grace = Duration::ZERO;
        let coordinator = Coordinator::new(config, "test-node-1".to_string(), ledger.clone());
        (Arc::new(coordinator), ledger)
    }

    fn txn(id: u64) -> TransactionId {
        TransactionId::new(id)
    }

    fn acct(id: u64) -> AccountId {
        AccountId::new(id)
    }

    #[tokio::test]
    async fn test_coordinator_start_stop() {
        let (coordinator, _) = create_test_coordinator();
        assert_eq!(coordinator.state(), CoordinatorState::Starting);

        coordinator.start().await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Running);

        coordinator.stop().await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);

        assert!(matches!(
            coordinator.get_lock(txn(1), acct(1), 10).await,
            Err(TransferError::CoordinatorUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_get_lock_then_commit() {
        let (coordinator, ledger) = create_test_coordinator();

        coordinator.get_lock(txn(5), acct(1), 40).await.unwrap();
        assert!(coordinator.is_locked(acct(1)));
        assert_eq!(coordinator.pending(txn(5)).unwrap().amount, 40);
        // Reserving does not touch the ledger.
        assert_eq!(ledger.balance(acct(1)), Some(100));

        coordinator.commit(txn(5)).await.unwrap();
        assert_eq!(ledger.balance(acct(1)), Some(60));
        assert!(!coordinator.is_locked(acct(1)));
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_get_lock_conflict() {
        let (coordinator, _) = create_test_coordinator();

        coordinator.get_lock(txn(6), acct(1), 40).await.unwrap();
        assert_eq!(
            coordinator.get_lock(txn(7), acct(1), 10).await,
            Err(TransferError::LockConflict(acct(1)))
        );
        assert!(coordinator.pending(txn(7)).is_none());
        assert_eq!(coordinator.metrics().snapshot().lock_conflicts, 1);
    }

    #[tokio::test]
    async fn test_unknown_account_is_insufficient() {
        let (coordinator, _) = create_test_coordinator();

        assert_eq!(
            coordinator.get_lock(txn(1), acct(42), 1).await,
            Err(TransferError::InsufficientFunds {
                account: acct(42),
                required: 1
            })
        );
        assert!(!coordinator.is_locked(acct(42)));
    }

    #[tokio::test]
    async fn test_invalid_amount() {
        let (coordinator, _) = create_test_coordinator();

        assert_eq!(
            coordinator.get_lock(txn(1), acct(1), 0).await,
            Err(TransferError::InvalidAmount(0))
        );
        assert_eq!(
            coordinator.get_lock(txn(1), acct(1), -40).await,
            Err(TransferError::InvalidAmount(-40))
        );
        assert_eq!(coordinator.locked_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_transaction_releases_new_lock() {
        let (coordinator, _) = create_test_coordinator();

        coordinator.get_lock(txn(1), acct(1), 10).await.unwrap();
        assert_eq!(
            coordinator.get_lock(txn(1), acct(2), 3).await,
            Err(TransferError::DuplicateTransaction(txn(1)))
        );

        assert!(coordinator.is_locked(acct(1)));
        assert!(!coordinator.is_locked(acct(2)));
        assert_eq!(coordinator.pending(txn(1)).unwrap().account_id, acct(1));
    }

    #[tokio::test]
    async fn test_balance_check_unavailable() {
        let (coordinator, ledger) = create_test_coordinator();
        ledger.set_available(false);

        assert!(matches!(
            coordinator.get_lock(txn(1), acct(1), 10).await,
            Err(TransferError::LedgerUnavailable(_))
        ));
        assert!(!coordinator.is_locked(acct(1)));
    }

    #[tokio::test]
    async fn test_sweep_aborts_expired_reservations() {
        let ledger = Arc::new(InMemoryLedger::with_accounts([(acct(1), 100)]));
        let mut config = CoordinatorConfig::default();
        config.lock_config.reservation_ttl = Some(Duration::from_secs(30));
        let coordinator = Coordinator::new(config, "test-node-1".to_string(), ledger.clone());

        coordinator.get_lock(txn(1), acct(1), 10).await.unwrap();
        let expires_at = coordinator.pending(txn(1)).unwrap().expires_at.unwrap();

        assert_eq!(coordinator.sweep_expired(), 0);
        assert_eq!(coordinator.sweep_expired_at(expires_at), 1);

        assert!(!coordinator.is_locked(acct(1)));
        assert_eq!(
            coordinator.commit(txn(1)).await,
            Err(TransferError::PaymentNotFound(txn(1)))
        );
        assert_eq!(ledger.balance(acct(1)), Some(100));
        assert_eq!(coordinator.metrics().snapshot().reservations_expired, 1);
    }

    #[tokio::test]
    async fn test_gates_released_when_idle() {
        let (coordinator, _) = create_test_coordinator();

        for id in 1_000..2_000 {
            let _ = coordinator.get_lock(txn(id), acct(id), 1).await;
        }
        coordinator.get_lock(txn(1), acct(1), 10).await.unwrap();
        let _ = coordinator.get_lock(txn(2), acct(1), 10).await;
        coordinator.commit(txn(1)).await.unwrap();

        assert_eq!(coordinator.gates.len(), 0);
        assert_eq!(coordinator.locked_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_gates_released_after_contention() {
        let (coordinator, _) = create_test_coordinator();

        let tasks: Vec<_> = (0..32u64)
            .map(|i| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.get_lock(txn(i), acct(1 + i % 3), 1).await })
            })
            .collect();
        for task in tasks {
            let _ = task.await.unwrap();
        }

        assert_eq!(coordinator.gates.len(), 0);
        assert_eq!(coordinator.locked_count(), coordinator.pending_count());
    }

    #[tokio::test]
    async fn test_duplicate_keeps_active_gauge() {
        let (coordinator, _) = create_test_coordinator();

        coordinator.get_lock(txn(1), acct(1), 10).await.unwrap();
        let _ = coordinator.get_lock(txn(1), acct(2), 3).await;
        assert_eq!(coordinator.metrics().snapshot().reservations_active, 1);

        coordinator.abort(txn(1)).await.unwrap();
        assert_eq!(coordinator.metrics().snapshot().reservations_active, 0);
    }

    #[tokio::test]
    async fn test_stop_sweeps_expiring_leases() {
        let ledger = Arc::new(InMemoryLedger::with_accounts([(acct(1), 100)]));
        let mut config = CoordinatorConfig::default();
        config.lock_config.reservation_ttl = Some(Duration::from_millis(100));
        config.lock_config.sweep_interval = Duration::from_millis(20);
        config.shutdown_grace = Duration::from_secs(10);
        let coordinator = Arc::new(Coordinator::new(config, "test-node-1".to_string(), ledger));

        coordinator.start().await.unwrap();
        coordinator.get_lock(txn(1), acct(1), 10).await.unwrap();

        let started = std::time::Instant::now();
        coordinator.stop().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(coordinator.pending_count(), 0);
        assert!(!coordinator.is_locked(acct(1)));
        assert_eq!(coordinator.metrics().snapshot().reservations_expired, 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (coordinator, _) = create_test_coordinator();
        coordinator.start().await.unwrap();

        coordinator.stop().await.unwrap();
        coordinator.stop().await.unwrap();

        assert!(coordinator.state().is_terminal());
    }
}
