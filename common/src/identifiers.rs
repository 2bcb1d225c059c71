//! Identifier types for coordinator entities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a two-phase transaction, chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Create a transaction ID from its wire value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw wire value.
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

impl From<u64> for TransactionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Identifier of a ledger account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(u64);

impl AccountId {
    /// Create an account ID from its wire value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw wire value.
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Parse from a decimal string.
    pub fn parse(s: &str) -> Result<Self, std::num::ParseIntError> {
        Ok(Self(s.trim().parse()?))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct-{}", self.0)
    }
}

impl From<u64> for AccountId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Amount of money in minor units.
pub type Amount = i64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_display() {
        assert_eq!(TransactionId::new(5).to_string(), "txn-5");
        assert_eq!(TransactionId::from(5).value(), 5);
    }

    #[test]
    fn test_account_id_parse() {
        assert_eq!(AccountId::parse(" 42 ").unwrap(), AccountId::new(42));
        assert!(AccountId::parse("abc").is_err());
        assert!(AccountId::parse("-1").is_err());
    }

    #[test]
    fn test_ids_serialize_as_numbers() {
        let json = serde_json::to_string(&AccountId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
