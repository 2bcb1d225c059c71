//! Registry of reserved, not yet resolved transactions.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use twophase_common::{
    PendingTransaction, Result, Timestamp, TransactionId, TransferError,
};

/// Maps transaction identifiers to their reservations.
///
/// Only atomic operations are exposed: `reserve` inserts if absent and
/// `take` removes and returns in one step, so a reservation can be consumed
/// by at most one caller.
pub struct PendingRegistry {
    pending: DashMap<TransactionId, PendingTransaction>,
}

impl PendingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Store a reservation. Fails if the identifier is already pending.
    pub fn reserve(&self, transaction: PendingTransaction) -> Result<()> {
        let transaction_id = transaction.transaction_id;
        match self.pending.entry(transaction_id) {
            Entry::Occupied(_) => Err(TransferError::DuplicateTransaction(transaction_id)),
            Entry::Vacant(slot) => {
                debug!(
                    transaction_id = %transaction_id,
                    account = %transaction.account_id,
                    amount = transaction.amount,
                    "Reservation stored"
                );
                slot.insert(transaction);
                Ok(())
            }
        }
    }

    /// Remove and return the reservation for `transaction_id`.
    pub fn take(&self, transaction_id: TransactionId) -> Option<PendingTransaction> {
        self.pending.remove(&transaction_id).map(|(_, txn)| txn)
    }

    /// Remove and return the reservation only if its lease has run out at `at`.
    ///
    /// The check and the removal happen under one shard lock, so a reservation
    /// resolved and re-reserved after `expired` listed it is left alone.
    pub fn take_expired(
        &self,
        transaction_id: TransactionId,
        at: Timestamp,
    ) -> Option<PendingTransaction> {
        self.pending
            .remove_if(&transaction_id, |_, txn| txn.is_expired_at(at))
            .map(|(_, txn)| txn)
    }

    /// Get a copy of a reservation without removing it.
    pub fn get(&self, transaction_id: TransactionId) -> Option<PendingTransaction> {
        self.pending.get(&transaction_id).map(|t| t.clone())
    }

    /// List identifiers whose lease has run out at `at`.
    pub fn expired(&self, at: Timestamp) -> Vec<TransactionId> {
        self.pending
            .iter()
            .filter(|t| t.is_expired_at(at))
            .map(|t| t.transaction_id)
            .collect()
    }

    /// Get count of pending reservations.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for PendingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use twophase_common::{now, AccountId};

    fn reservation(id: u64, amount: i64) -> PendingTransaction {
        PendingTransaction::new(TransactionId::new(id), AccountId::new(1), amount)
    }

    #[test]
    fn test_reserve_and_take() {
        let registry = PendingRegistry::new();
        registry.reserve(reservation(5, 40)).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(TransactionId::new(5)).unwrap().amount, 40);

        let taken = registry.take(TransactionId::new(5)).unwrap();
        assert_eq!(taken.amount, 40);
        assert!(registry.take(TransactionId::new(5)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_reserve_rejected() {
        let registry = PendingRegistry::new();
        registry.reserve(reservation(5, 40)).unwrap();

        assert_eq!(
            registry.reserve(reservation(5, 10)),
            Err(TransferError::DuplicateTransaction(TransactionId::new(5)))
        );
        // The original reservation is untouched.
        assert_eq!(registry.get(TransactionId::new(5)).unwrap().amount, 40);
    }

    #[test]
    fn test_expired() {
        let registry = PendingRegistry::new();
        registry
            .reserve(reservation(1, 10).with_lease(Duration::seconds(5)))
            .unwrap();
        registry.reserve(reservation(2, 10)).unwrap();

        assert!(registry.expired(now()).is_empty());
        assert_eq!(
            registry.expired(now() + Duration::seconds(10)),
            vec![TransactionId::new(1)]
        );
    }

    #[test]
    fn test_take_expired_skips_live_reservations() {
        let registry = PendingRegistry::new();
        registry
            .reserve(reservation(1, 10).with_lease(Duration::seconds(5)))
            .unwrap();
        registry.reserve(reservation(2, 10)).unwrap();

        assert!(registry.take_expired(TransactionId::new(1), now()).is_none());
        assert!(registry
            .take_expired(TransactionId::new(2), now() + Duration::days(1))
            .is_none());

        let taken = registry
            .take_expired(TransactionId::new(1), now() + Duration::seconds(10))
            .unwrap();
        assert_eq!(taken.transaction_id, TransactionId::new(1));
        assert_eq!(registry.len(), 1);
    }
}
