//! Pending transaction record shared between the registry and the coordinator.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::time::{now, Timestamp};
use crate::{AccountId, Amount, TransactionId};

/// A transfer reserved by `GetLock` and awaiting `Commit` or `Abort`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Caller-chosen transaction identifier.
    pub transaction_id: TransactionId,
    /// Account the amount will be debited from.
    pub account_id: AccountId,
    /// Reserved amount.
    pub amount: Amount,
    /// When the reservation was made.
    pub reserved_at: Timestamp,
    /// Lease deadline, if reservations expire.
    pub expires_at: Option<Timestamp>,
}

impl PendingTransaction {
    /// Create a reservation stamped with the current time.
    pub fn new(transaction_id: TransactionId, account_id: AccountId, amount: Amount) -> Self {
        Self {
            transaction_id,
            account_id,
            amount,
            reserved_at: now(),
            expires_at: None,
        }
    }

    /// Attach a lease that expires `ttl` after the reservation time.
    ///
    /// A lease too long to represent never expires.
    pub fn with_lease(mut self, ttl: Duration) -> Self {
        self.expires_at = self.reserved_at.checked_add_signed(ttl);
        self
    }

    /// Check if the lease has run out at `at`.
    pub fn is_expired_at(&self, at: Timestamp) -> bool {
        self.expires_at.is_some_and(|deadline| at >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_lease_never_expires() {
        let txn = PendingTransaction::new(TransactionId::new(1), AccountId::new(1), 40);
        assert!(txn.expires_at.is_none());
        assert!(!txn.is_expired_at(now() + Duration::days(365)));
    }

    #[test]
    fn test_lease_expiry() {
        let txn = PendingTransaction::new(TransactionId::new(1), AccountId::new(1), 40)
            .with_lease(Duration::seconds(30));
        assert!(!txn.is_expired_at(txn.reserved_at + Duration::seconds(29)));
        assert!(txn.is_expired_at(txn.reserved_at + Duration::seconds(30)));
    }
}
