//! Error types for the two-phase commit protocol.

use crate::{AccountId, Amount, TransactionId};
use thiserror::Error;

/// Errors surfaced to callers of `GetLock`, `Commit` and `Abort`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The account already has a reservation held by another transaction.
    #[error("Account {0} is locked")]
    LockConflict(AccountId),

    /// The balance does not cover the requested amount.
    #[error("Insufficient funds in {account}: required {required}")]
    InsufficientFunds { account: AccountId, required: Amount },

    /// No pending transaction with this identifier exists.
    #[error("Payment {0} not found")]
    PaymentNotFound(TransactionId),

    /// The ledger could not be reached or returned an unexpected error.
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// A reservation with this identifier is already pending.
    #[error("Transaction {0} is already pending")]
    DuplicateTransaction(TransactionId),

    /// The requested amount is not a positive value.
    #[error("Invalid amount {0}: must be positive")]
    InvalidAmount(Amount),

    /// The coordinator is not accepting new reservations.
    #[error("Coordinator unavailable: {0}")]
    CoordinatorUnavailable(String),
}

impl TransferError {
    /// Check if the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransferError::LockConflict(_) | TransferError::CoordinatorUnavailable(_)
        )
    }

    /// Get error code for RPC status messages.
    pub fn error_code(&self) -> &'static str {
        match self {
            TransferError::LockConflict(_) => "LOCK_CONFLICT",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            TransferError::LedgerUnavailable(_) => "LEDGER_UNAVAILABLE",
            TransferError::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            TransferError::InvalidAmount(_) => "INVALID_AMOUNT",
            TransferError::CoordinatorUnavailable(_) => "COORDINATOR_UNAVAILABLE",
        }
    }
}

/// Result type alias for coordinator operations.
pub type Result<T> = std::result::Result<T, TransferError>;
