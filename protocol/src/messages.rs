//! Protocol message types.
//!
//! Field tags follow the `TwoPhaseCommitServer` service definition:
//!
//! ```text
//! rpc GetLock(Payment) returns (IsSuccessful);
//! rpc Commit(PaymentID) returns (IsSuccessful);
//! rpc Abort(PaymentID) returns (IsSuccessful);
//! ```

use prost::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use twophase_common::{AccountId, Amount, TransactionId, TransferError};

/// Reservation request sent in the prepare phase.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct Payment {
    /// Transaction identifier.
    #[prost(uint64, tag = "1")]
    pub id: u64,
    /// Account to debit.
    #[prost(uint64, tag = "2")]
    pub from: u64,
    /// Account to credit (carried for the caller; not used by the coordinator).
    #[prost(uint64, tag = "3")]
    pub to: u64,
    /// Amount in minor units.
    #[prost(int64, tag = "4")]
    pub amount: i64,
}

impl Payment {
    /// Create a payment request.
    pub fn new(id: TransactionId, from: AccountId, amount: Amount) -> Self {
        Self {
            id: id.value(),
            from: from.value(),
            to: 0,
            amount,
        }
    }

    /// Get the transaction identifier.
    pub fn transaction_id(&self) -> TransactionId {
        TransactionId::new(self.id)
    }

    /// Get the debited account.
    pub fn from_account(&self) -> AccountId {
        AccountId::new(self.from)
    }
}

/// Identifies a transaction in the commit and abort phases.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct PaymentId {
    /// Transaction identifier.
    #[prost(uint64, tag = "1")]
    pub id: u64,
}

impl PaymentId {
    /// Create a payment identifier message.
    pub fn new(id: TransactionId) -> Self {
        Self { id: id.value() }
    }

    /// Get the transaction identifier.
    pub fn transaction_id(&self) -> TransactionId {
        TransactionId::new(self.id)
    }
}

/// Reply of every RPC.
#[derive(Clone, Copy, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct IsSuccessful {
    #[prost(bool, tag = "1")]
    pub successful: bool,
}

impl IsSuccessful {
    pub fn yes() -> Self {
        Self { successful: true }
    }

    pub fn no() -> Self {
        Self { successful: false }
    }
}

/// Error status attached to a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct RpcStatus {
    /// Stable error code (e.g. `LOCK_CONFLICT`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Reply body sent alongside the error.
    pub reply: IsSuccessful,
}

impl From<TransferError> for RpcStatus {
    fn from(error: TransferError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            reply: IsSuccessful::no(),
        }
    }
}

/// Result of an RPC call.
pub type RpcResult = Result<IsSuccessful, RpcStatus>;
