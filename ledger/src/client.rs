//! Ledger client interface consumed by the coordinator.

use async_trait::async_trait;
use thiserror::Error;

use twophase_common::{AccountId, Amount};

/// Errors reported by a ledger backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// No account with this identifier exists.
    #[error("Account {0} not found")]
    NotFound(AccountId),

    /// The update matched no record (missing account or balance changed underneath).
    #[error("Account {0} was not modified")]
    Unmodified(AccountId),

    /// The backend could not be reached or failed.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Storage engine operations needed by the coordinator.
///
/// Implementations may block on I/O; the coordinator never holds a shared
/// map guard across these calls.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Get backend name for logging.
    fn name(&self) -> &'static str;

    /// Look up the current balance of an account.
    async fn check_balance(&self, account: AccountId) -> LedgerResult<Amount>;

    /// Decrease an account balance by `amount`.
    ///
    /// Returns [`LedgerError::Unmodified`] when no record was changed.
    async fn debit(&self, account: AccountId, amount: Amount) -> LedgerResult<()>;
}
