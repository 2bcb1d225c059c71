//! In-memory ledger engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use twophase_common::{AccountId, Amount};

use crate::account::Account;
use crate::client::{LedgerClient, LedgerError, LedgerResult};
use crate::journal::{EntryType, JournalEntry};

/// Ledger that keeps balances in process memory.
///
/// Debits are conditional: the balance is only decremented when the account
/// exists, is active and holds at least the debited amount, mirroring a
/// filtered update that reports how many records it modified.
pub struct InMemoryLedger {
    /// Accounts by ID.
    accounts: DashMap<AccountId, Account>,
    /// Applied mutations, in order.
    journal: Mutex<Vec<JournalEntry>>,
    /// When false every call fails with `Unavailable`.
    available: AtomicBool,
    /// Artificial I/O delay applied before each call.
    latency: Duration,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            journal: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            latency: Duration::ZERO,
        }
    }

    /// Create a ledger pre-populated with `(account, balance)` pairs.
    pub fn with_accounts(accounts: impl IntoIterator<Item = (AccountId, Amount)>) -> Self {
        let ledger = Self::new();
        for (id, balance) in accounts {
            ledger.open_account(id, balance);
        }
        ledger
    }

    /// Delay every call by `latency` to simulate a remote store.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Open (or reset) an account with an opening balance.
    pub fn open_account(&self, id: AccountId, balance: Amount) {
        self.accounts.insert(id, Account::new(id, balance));
        info!(account = %id, balance, "Account opened");
    }

    /// Get an account balance without going through the client interface.
    pub fn balance(&self, id: AccountId) -> Option<Amount> {
        self.accounts.get(&id).map(|a| a.balance)
    }

    /// Get a copy of an account.
    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(&id).map(|a| a.clone())
    }

    /// Freeze an account so further debits are not applied.
    pub fn freeze(&self, id: AccountId) -> bool {
        match self.accounts.get_mut(&id) {
            Some(mut account) => {
                account.freeze();
                true
            }
            None => false,
        }
    }

    /// Increase an account balance.
    pub fn credit(&self, id: AccountId, amount: Amount) -> LedgerResult<()> {
        let mut account = self
            .accounts
            .get_mut(&id)
            .ok_or(LedgerError::NotFound(id))?;
        account.balance += amount;
        account.updated_at = chrono::Utc::now();
        self.journal
            .lock()
            .push(JournalEntry::credit(id, amount, account.balance));
        Ok(())
    }

    /// Toggle availability for fault injection.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        warn!(available, "Ledger availability changed");
    }

    /// Get all journal entries for an account.
    pub fn entries_for(&self, id: AccountId) -> Vec<JournalEntry> {
        self.journal
            .lock()
            .iter()
            .filter(|e| e.account_id == id)
            .cloned()
            .collect()
    }

    /// Count debits applied to an account.
    pub fn debit_count(&self, id: AccountId) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|e| e.account_id == id && e.entry_type == EntryType::Debit)
            .count()
    }

    /// Get the total of all balances.
    pub fn total_balance(&self) -> Amount {
        self.accounts.iter().map(|a| a.balance).sum()
    }

    async fn simulate_io(&self) -> LedgerResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn check_balance(&self, account: AccountId) -> LedgerResult<Amount> {
        self.simulate_io().await?;

        let balance = self
            .accounts
            .get(&account)
            .map(|a| a.balance)
            .ok_or(LedgerError::NotFound(account))?;

        debug!(account = %account, balance, "Balance checked");
        Ok(balance)
    }

    #[instrument(skip(self))]
    async fn debit(&self, account: AccountId, amount: Amount) -> LedgerResult<()> {
        self.simulate_io().await?;

        let mut entry = match self.accounts.get_mut(&account) {
            Some(entry) => entry,
            None => return Err(LedgerError::Unmodified(account)),
        };

        if !entry.can_transact() || !entry.has_sufficient_funds(amount) {
            return Err(LedgerError::Unmodified(account));
        }

        entry.balance -= amount;
        entry.updated_at = chrono::Utc::now();
        let balance_after = entry.balance;
        drop(entry);

        self.journal
            .lock()
            .push(JournalEntry::debit(account, amount, balance_after));

        info!(account = %account, amount, balance_after, "Account debited");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_ledger() -> InMemoryLedger {
        InMemoryLedger::with_accounts([(AccountId::new(1), 100), (AccountId::new(2), 5)])
    }

    #[tokio::test]
    async fn test_check_balance() {
        let ledger = create_test_ledger();

        assert_eq!(ledger.check_balance(AccountId::new(1)).await, Ok(100));
        assert_eq!(
            ledger.check_balance(AccountId::new(3)).await,
            Err(LedgerError::NotFound(AccountId::new(3)))
        );
    }

    #[tokio::test]
    async fn test_debit_applies_once() {
        let ledger = create_test_ledger();

        ledger.debit(AccountId::new(1), 40).await.unwrap();

        assert_eq!(ledger.balance(AccountId::new(1)), Some(60));
        assert_eq!(ledger.debit_count(AccountId::new(1)), 1);
        let entries = ledger.entries_for(AccountId::new(1));
        assert_eq!(entries[0].balance_after, 60);
    }

    #[tokio::test]
    async fn test_debit_unmodified() {
        let ledger = create_test_ledger();

        assert_eq!(
            ledger.debit(AccountId::new(2), 10).await,
            Err(LedgerError::Unmodified(AccountId::new(2)))
        );
        assert_eq!(
            ledger.debit(AccountId::new(9), 1).await,
            Err(LedgerError::Unmodified(AccountId::new(9)))
        );
        assert_eq!(ledger.balance(AccountId::new(2)), Some(5));

        ledger.freeze(AccountId::new(1));
        assert!(ledger.debit(AccountId::new(1), 1).await.is_err());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let ledger = create_test_ledger();
        ledger.set_available(false);

        assert!(matches!(
            ledger.check_balance(AccountId::new(1)).await,
            Err(LedgerError::Unavailable(_))
        ));
        assert!(matches!(
            ledger.debit(AccountId::new(1), 1).await,
            Err(LedgerError::Unavailable(_))
        ));

        ledger.set_available(true);
        assert!(ledger.debit(AccountId::new(1), 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_credit_and_total() {
        let ledger = create_test_ledger();
        ledger.credit(AccountId::new(2), 10).unwrap();

        assert_eq!(ledger.balance(AccountId::new(2)), Some(15));
        assert_eq!(ledger.total_balance(), 115);
        assert!(ledger.credit(AccountId::new(9), 1).is_err());
    }
}
