//! Account definitions for the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use twophase_common::{AccountId, Amount};

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Account is active and can transact.
    Active,
    /// Account is frozen (no debits allowed).
    Frozen,
}

/// A ledger account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier.
    pub id: AccountId,
    /// Current balance in minor units.
    pub balance: Amount,
    /// Account status.
    pub status: AccountStatus,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account.
    pub fn new(id: AccountId, balance: Amount) -> Self {
        let now = Utc::now();

        Self {
            id,
            balance,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if account can be debited.
    pub fn can_transact(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Check if the balance covers `amount`.
    pub fn has_sufficient_funds(&self, amount: Amount) -> bool {
        self.balance >= amount
    }

    /// Freeze the account.
    pub fn freeze(&mut self) {
        self.status = AccountStatus::Frozen;
        self.updated_at = Utc::now();
    }

    /// Unfreeze the account.
    pub fn unfreeze(&mut self) {
        self.status = AccountStatus::Active;
        self.updated_at = Utc::now();
    }
}
