//! Journal of balance mutations applied by the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use twophase_common::{AccountId, Amount};

/// Type of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Balance decreased.
    Debit,
    /// Balance increased.
    Credit,
}

/// A single applied balance mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique entry ID.
    pub id: Uuid,
    /// Account affected.
    pub account_id: AccountId,
    /// Entry type (debit or credit).
    pub entry_type: EntryType,
    /// Amount.
    pub amount: Amount,
    /// Balance after this entry.
    pub balance_after: Amount,
    /// When this entry was created.
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Create a debit entry.
    pub fn debit(account_id: AccountId, amount: Amount, balance_after: Amount) -> Self {
        Self::new(account_id, EntryType::Debit, amount, balance_after)
    }

    /// Create a credit entry.
    pub fn credit(account_id: AccountId, amount: Amount, balance_after: Amount) -> Self {
        Self::new(account_id, EntryType::Credit, amount, balance_after)
    }

    fn new(
        account_id: AccountId,
        entry_type: EntryType,
        amount: Amount,
        balance_after: Amount,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            account_id,
            entry_type,
            amount,
            balance_after,
            created_at: Utc::now(),
        }
    }

    /// Get the signed effect of this entry on the balance.
    pub fn signed_amount(&self) -> Amount {
        match self.entry_type {
            EntryType::Debit => -self.amount,
            EntryType::Credit => self.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_amount() {
        let debit = JournalEntry::debit(AccountId::new(1), 40, 60);
        let credit = JournalEntry::credit(AccountId::new(1), 40, 100);

        assert_eq!(debit.signed_amount(), -40);
        assert_eq!(credit.signed_amount(), 40);
        assert_ne!(debit.id, credit.id);
    }
}
