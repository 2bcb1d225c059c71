//! Per-account lock table.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use twophase_common::AccountId;

/// A held lock on an account.
#[derive(Debug, Clone)]
pub struct LockEntry {
    /// Locked account.
    pub account_id: AccountId,
    /// When the lock was taken.
    pub locked_at: Instant,
}

impl LockEntry {
    fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            locked_at: Instant::now(),
        }
    }

    /// Get how long the lock has been held.
    pub fn held_for(&self) -> Duration {
        self.locked_at.elapsed()
    }
}

/// Maps accounts to their lock state.
///
/// An account is locked while an entry exists for it. Entries are created
/// on acquisition and removed on release; raw map access is never exposed.
pub struct LockTable {
    entries: DashMap<AccountId, LockEntry>,
}

impl LockTable {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Lock `account` unless it is already locked.
    ///
    /// The test and the set happen under one shard lock, so two callers can
    /// never both observe the account as free.
    pub fn try_acquire(&self, account: AccountId) -> bool {
        match self.entries.entry(account) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(LockEntry::new(account));
                debug!(account = %account, "Account locked");
                true
            }
        }
    }

    /// Unlock `account`. Releasing an unlocked account is a no-op.
    pub fn release(&self, account: AccountId) {
        if let Some((_, entry)) = self.entries.remove(&account) {
            debug!(
                account = %account,
                held_ms = entry.held_for().as_millis() as u64,
                "Account unlocked"
            );
        }
    }

    /// Check whether `account` is currently locked.
    pub fn is_locked(&self, account: AccountId) -> bool {
        self.entries.contains_key(&account)
    }

    /// Get count of locked accounts.
    pub fn locked_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}
