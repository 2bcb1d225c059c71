//! Simulated account population.

use std::sync::Arc;

use twophase_common::{AccountId, Amount};
use twophase_ledger::InMemoryLedger;

/// Account factory for seeding test ledgers.
pub struct AccountFactory;

impl AccountFactory {
    /// Create `count` accounts numbered from 1, each holding `initial_balance`.
    pub fn create_accounts(count: usize, initial_balance: Amount) -> Vec<(AccountId, Amount)> {
        (1..=count as u64)
            .map(|id| (AccountId::new(id), initial_balance))
            .collect()
    }

    /// Build a ledger holding `accounts`, answering every call after `latency`.
    pub fn ledger(
        accounts: &[(AccountId, Amount)],
        latency: std::time::Duration,
    ) -> Arc<InMemoryLedger> {
        Arc::new(InMemoryLedger::with_accounts(accounts.iter().copied()).with_latency(latency))
    }
}
