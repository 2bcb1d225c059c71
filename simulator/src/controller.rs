//! Simulation controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, ensure, Context};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use twophase_common::{AccountId, Amount, TransactionId};
use twophase_coordinator::{Coordinator, CoordinatorConfig, TwoPhaseCommit, TwoPhaseCommitService};
use twophase_ledger::InMemoryLedger;
use twophase_protocol::{Payment, PaymentId, RpcResult};

use crate::accounts::AccountFactory;
use crate::metrics::SimulationMetrics;
use crate::scenario::{Expect, Scenario, ScenarioStep};

/// Pause between two transfers of one worker at speed 1.0.
const BASE_TRANSFER_DELAY_MS: f64 = 10.0;

/// Share of random transfers committed rather than aborted.
const COMMIT_RATIO: f64 = 0.9;

/// Controls the simulation.
pub struct SimulationController {
    /// Seeded accounts.
    accounts: Vec<(AccountId, Amount)>,
    /// Simulation speed multiplier.
    speed: f64,
    /// Random number generator.
    rng: Arc<RwLock<StdRng>>,
    /// Ledger behind the coordinator.
    ledger: Arc<InMemoryLedger>,
    /// Coordinator under test.
    coordinator: Arc<Coordinator>,
    /// RPC surface the simulated clients call.
    service: Arc<TwoPhaseCommitService>,
    /// Simulation metrics.
    metrics: Arc<RwLock<SimulationMetrics>>,
    /// Running flag.
    running: Arc<RwLock<bool>>,
    /// Next transaction id handed to a random transfer.
    next_transaction: Arc<AtomicU64>,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(
        accounts: Vec<(AccountId, Amount)>,
        speed: f64,
        seed: Option<u64>,
        ledger_latency: Duration,
    ) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let ledger = AccountFactory::ledger(&accounts, ledger_latency);

        let mut config = CoordinatorConfig::default();
        config.shutdown_grace = Duration::from_millis(500);
        let coordinator = Arc::new(Coordinator::new(
            config,
            "simulator".to_string(),
            ledger.clone(),
        ));
        let service = Arc::new(TwoPhaseCommitService::new(coordinator.clone()));

        Self {
            accounts,
            speed,
            rng: Arc::new(RwLock::new(rng)),
            ledger,
            coordinator,
            service,
            metrics: Arc::new(RwLock::new(SimulationMetrics::new())),
            running: Arc::new(RwLock::new(false)),
            next_transaction: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Create a controller seeded with a scenario's accounts.
    pub fn for_scenario(scenario: &Scenario, speed: f64) -> Self {
        let accounts = scenario
            .accounts
            .iter()
            .map(|(id, balance)| (AccountId::new(*id), *balance))
            .collect();
        Self::new(accounts, speed, None, Duration::ZERO)
    }

    /// Initialize the simulation.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        info!("Initializing simulation with {} accounts", self.accounts.len());

        self.coordinator.start().await?;

        for (id, balance) in &self.accounts {
            debug!("Opened account {} with balance {}", id, balance);
        }

        Ok(())
    }

    /// Run a scenario, failing at the first step with an unexpected outcome.
    pub async fn run_scenario(&self, scenario: &Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        *self.running.write().await = true;

        for (index, step) in scenario.steps.iter().enumerate() {
            if !*self.running.read().await {
                break;
            }

            self.execute_step(step)
                .await
                .with_context(|| format!("scenario {} step {}", scenario.name, index + 1))?;
        }

        *self.running.write().await = false;

        info!("Scenario {} passed", scenario.name);
        Ok(())
    }

    /// Run random concurrent transfers for `duration`, or until Ctrl+C.
    ///
    /// Each committed transfer credits its recipient, so the ledger total is
    /// conserved; [`verify_invariants`](Self::verify_invariants) checks that
    /// afterwards.
    pub async fn run(&self, duration: Option<Duration>, concurrency: usize) -> anyhow::Result<()> {
        ensure!(self.accounts.len() >= 2, "random traffic needs at least two accounts");
        ensure!(concurrency > 0, "concurrency must be positive");

        info!(
            "Running random traffic with {} workers over {} accounts",
            concurrency,
            self.accounts.len()
        );

        *self.running.write().await = true;

        let max_amount = self
            .accounts
            .iter()
            .map(|(_, balance)| *balance)
            .max()
            .unwrap_or(0)
            .max(4)
            / 4;
        let delay = Duration::from_secs_f64(BASE_TRANSFER_DELAY_MS / 1000.0 / self.speed);

        let handles: Vec<_> = (0..concurrency)
            .map(|worker| {
                let client = TransferClient {
                    accounts: self.accounts.iter().map(|(id, _)| *id).collect(),
                    max_amount,
                    rng: self.rng.clone(),
                    ledger: self.ledger.clone(),
                    service: self.service.clone(),
                    metrics: self.metrics.clone(),
                    next_transaction: self.next_transaction.clone(),
                };
                let running = self.running.clone();

                tokio::spawn(async move {
                    loop {
                        if !*running.read().await {
                            break;
                        }

                        client.transfer().await;
                        tokio::time::sleep(delay).await;
                    }
                    debug!("Worker {} stopped", worker);
                })
            })
            .collect();

        // Wait for duration or Ctrl+C
        match duration {
            Some(d) => {
                tokio::time::sleep(d).await;
            }
            None => {
                tokio::signal::ctrl_c().await?;
            }
        }

        *self.running.write().await = false;
        for joined in join_all(handles).await {
            joined?;
        }

        Ok(())
    }

    /// Check that no reservation leaked and the ledger total is conserved.
    pub fn verify_invariants(&self) -> anyhow::Result<()> {
        let pending = self.coordinator.pending_count();
        let locked = self.coordinator.locked_count();
        ensure!(
            pending == locked,
            "{} pending reservations but {} locked accounts",
            pending,
            locked
        );
        ensure!(locked == 0, "{} accounts still locked", locked);

        let expected: Amount = self.accounts.iter().map(|(_, balance)| *balance).sum();
        let actual = self.ledger.total_balance();
        ensure!(
            expected == actual,
            "ledger total {} differs from seeded total {}",
            actual,
            expected
        );

        Ok(())
    }

    /// Execute a single scenario step.
    async fn execute_step(&self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Wait { millis } => {
                let adjusted = (*millis as f64 / self.speed) as u64;
                info!("Waiting {}ms (adjusted: {}ms)", millis, adjusted);
                tokio::time::sleep(Duration::from_millis(adjusted)).await;
            }
            ScenarioStep::GetLock {
                transaction,
                account,
                amount,
                expect,
            } => {
                info!("GetLock txn {} on account {} for {}", transaction, account, amount);

                let payment = Payment::new(
                    TransactionId::new(*transaction),
                    AccountId::new(*account),
                    *amount,
                );
                let result = self.service.get_lock(payment).await;
                self.record_lock_failure(&result).await;
                check_outcome("GetLock", &result, expect)?;
            }
            ScenarioStep::ConcurrentGetLock {
                transactions,
                account,
                amount,
                granted,
            } => {
                info!(
                    "GetLock x{} on account {} for {}",
                    transactions.len(),
                    account,
                    amount
                );

                let calls = transactions.iter().map(|transaction| {
                    let payment = Payment::new(
                        TransactionId::new(*transaction),
                        AccountId::new(*account),
                        *amount,
                    );
                    self.service.get_lock(payment)
                });
                let results = join_all(calls).await;

                for result in &results {
                    self.record_lock_failure(result).await;
                }

                let won = results.iter().filter(|r| r.is_ok()).count();
                if won != *granted {
                    bail!("{} reservations granted, expected {}", won, granted);
                }
                if let Some(Err(status)) = results
                    .iter()
                    .find(|r| matches!(r, Err(s) if s.code != "LOCK_CONFLICT"))
                {
                    bail!("concurrent GetLock failed with {}", status);
                }
            }
            ScenarioStep::Commit {
                transaction,
                expect,
            } => {
                info!("Commit txn {}", transaction);

                let transaction = TransactionId::new(*transaction);
                let amount = self.coordinator.pending(transaction).map(|p| p.amount);
                let started = Instant::now();
                let result = self.service.commit(PaymentId::new(transaction)).await;

                match (&result, amount) {
                    (Ok(_), Some(amount)) => {
                        self.metrics
                            .write()
                            .await
                            .record_commit(amount, elapsed_ms(started));
                    }
                    _ if result.is_err() => self.metrics.write().await.record_failure(),
                    _ => {}
                }
                check_outcome("Commit", &result, expect)?;
            }
            ScenarioStep::Abort { transaction } => {
                info!("Abort txn {}", transaction);

                let transaction = TransactionId::new(*transaction);
                let reserved = self.coordinator.pending(transaction).is_some();
                let started = Instant::now();
                let result = self.service.abort(PaymentId::new(transaction)).await;

                if reserved && result.is_ok() {
                    self.metrics.write().await.record_abort(elapsed_ms(started));
                }
                check_outcome("Abort", &result, &Expect::Success)?;
            }
            ScenarioStep::AssertBalance { account, balance } => {
                let actual = self.ledger.balance(AccountId::new(*account));
                if actual != Some(*balance) {
                    bail!(
                        "account {} balance is {:?}, expected {}",
                        account,
                        actual,
                        balance
                    );
                }
            }
            ScenarioStep::AssertLocked { account, locked } => {
                let actual = self.coordinator.is_locked(AccountId::new(*account));
                if actual != *locked {
                    bail!("account {} locked is {}, expected {}", account, actual, locked);
                }
            }
        }

        Ok(())
    }

    async fn record_lock_failure(&self, result: &RpcResult) {
        match result {
            Ok(_) => {}
            Err(status) if status.code == "LOCK_CONFLICT" => {
                self.metrics.write().await.record_conflict()
            }
            Err(_) => self.metrics.write().await.record_failure(),
        }
    }

    /// Get simulation metrics.
    pub async fn metrics(&self) -> SimulationMetrics {
        self.metrics.read().await.clone()
    }

    /// Get the coordinator under test.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Stop the coordinator.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        *self.running.write().await = false;
        self.coordinator.stop().await?;
        Ok(())
    }
}

/// One simulated client issuing random transfers.
struct TransferClient {
    accounts: Vec<AccountId>,
    max_amount: Amount,
    rng: Arc<RwLock<StdRng>>,
    ledger: Arc<InMemoryLedger>,
    service: Arc<TwoPhaseCommitService>,
    metrics: Arc<RwLock<SimulationMetrics>>,
    next_transaction: Arc<AtomicU64>,
}

impl TransferClient {
    async fn transfer(&self) {
        let (from, to, amount, commit) = {
            let mut rng = self.rng.write().await;
            let from = rng.gen_range(0..self.accounts.len());
            let mut to = rng.gen_range(0..self.accounts.len());
            while to == from {
                to = rng.gen_range(0..self.accounts.len());
            }
            let amount = rng.gen_range(1..=self.max_amount);
            let commit = rng.gen_bool(COMMIT_RATIO);
            (self.accounts[from], self.accounts[to], amount, commit)
        };

        let transaction = TransactionId::new(self.next_transaction.fetch_add(1, Ordering::Relaxed));
        let started = Instant::now();

        let mut payment = Payment::new(transaction, from, amount);
        payment.to = to.value();

        match self.service.get_lock(payment).await {
            Ok(_) => {}
            Err(status) if status.code == "LOCK_CONFLICT" => {
                self.metrics.write().await.record_conflict();
                return;
            }
            Err(status) => {
                debug!("Transfer {} refused: {}", transaction, status);
                self.metrics.write().await.record_failure();
                return;
            }
        }

        let id = PaymentId::new(transaction);
        if !commit {
            if let Err(status) = self.service.abort(id).await {
                warn!("Abort of {} failed: {}", transaction, status);
            }
            self.metrics.write().await.record_abort(elapsed_ms(started));
            return;
        }

        match self.service.commit(id).await {
            Ok(_) => {
                if let Err(e) = self.ledger.credit(to, amount) {
                    warn!("Credit of {} to {} failed: {}", amount, to, e);
                }
                self.metrics
                    .write()
                    .await
                    .record_commit(amount, elapsed_ms(started));
            }
            Err(status) => {
                warn!("Commit of {} failed: {}", transaction, status);
                self.metrics.write().await.record_failure();
            }
        }
    }
}

fn check_outcome(rpc: &str, result: &RpcResult, expect: &Expect) -> anyhow::Result<()> {
    match (result, expect) {
        (Ok(_), Expect::Success) => Ok(()),
        (Err(status), Expect::Rejected { code }) if status.code == *code => Ok(()),
        (Ok(_), Expect::Rejected { code }) => bail!("{} succeeded, expected {}", rpc, code),
        (Err(status), Expect::Success) => bail!("{} failed with {}, expected success", rpc, status),
        (Err(status), Expect::Rejected { code }) => {
            bail!("{} failed with {}, expected {}", rpc, status.code, code)
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_built_in_scenarios_pass() {
        for name in Scenario::BUILT_IN {
            let scenario = Scenario::load(name).unwrap();
            let controller = SimulationController::for_scenario(&scenario, 1.0);
            controller.initialize().await.unwrap();

            controller.run_scenario(&scenario).await.unwrap();
            assert_eq!(controller.coordinator().locked_count(), 0, "{}", name);
            assert_eq!(controller.coordinator().pending_count(), 0, "{}", name);
        }
    }

    #[test]
    fn test_unexpected_outcome_fails_scenario() {
        let scenario = Scenario::from_json(
            r#"{
                "name": "wrong",
                "description": "expects a reservation that cannot be granted",
                "accounts": [[1, 10]],
                "steps": [
                    {"GetLock": {"transaction": 1, "account": 1, "amount": 50, "expect": "Success"}}
                ]
            }"#,
        )
        .unwrap();

        let controller = SimulationController::for_scenario(&scenario, 1.0);
        let error = tokio_test::block_on(controller.run_scenario(&scenario)).unwrap_err();

        assert!(format!("{:#}", error).contains("INSUFFICIENT_FUNDS"));
    }

    #[tokio::test]
    async fn test_contention_metrics() {
        let scenario = Scenario::load("contention").unwrap();
        let controller = SimulationController::for_scenario(&scenario, 1.0);

        controller.run_scenario(&scenario).await.unwrap();

        let metrics = controller.metrics().await;
        assert_eq!(metrics.conflicts, 15);
        assert_eq!(metrics.aborted, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_random_traffic_conserves_total() {
        let accounts = AccountFactory::create_accounts(5, 1_000);
        let controller =
            SimulationController::new(accounts, 1.0, Some(7), Duration::from_millis(1));
        controller.initialize().await.unwrap();

        controller
            .run(Some(Duration::from_millis(300)), 4)
            .await
            .unwrap();

        let metrics = controller.metrics().await;
        assert!(metrics.total_transfers > 0);
        assert_eq!(
            metrics.total_transfers,
            metrics.committed + metrics.aborted + metrics.conflicts + metrics.failed
        );
        controller.verify_invariants().unwrap();

        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_random_traffic_needs_two_accounts() {
        let controller = SimulationController::new(
            AccountFactory::create_accounts(1, 100),
            1.0,
            Some(1),
            Duration::ZERO,
        );

        assert!(controller.run(Some(Duration::from_millis(10)), 1).await.is_err());
    }
}
