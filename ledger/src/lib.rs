//! TwoPhase Ledger
//!
//! The ledger owns account balances. The coordinator only ever reaches it
//! through the [`LedgerClient`] trait: a balance lookup during `GetLock` and
//! a single debit during `Commit`.

pub mod client;
pub mod engine;
pub mod account;
pub mod journal;

pub use client::{LedgerClient, LedgerError, LedgerResult};
pub use engine::InMemoryLedger;
pub use account::{Account, AccountStatus};
pub use journal::{JournalEntry, EntryType};
