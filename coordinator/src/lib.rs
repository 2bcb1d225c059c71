//! TwoPhase Coordinator
//!
//! The coordinator reserves funds on a ledger account in a prepare phase
//! (`GetLock`) and applies or drops the reservation in a second phase
//! (`Commit` / `Abort`). It owns the per-account lock table and the registry
//! of pending transactions; balances stay in the ledger.

pub mod coordinator;
pub mod config;
pub mod lock_table;
pub mod registry;
pub mod service;
pub mod state;
pub mod metrics;

pub use coordinator::Coordinator;
pub use config::{ConfigError, CoordinatorConfig, LockConfig};
pub use service::{TwoPhaseCommit, TwoPhaseCommitService};
pub use state::CoordinatorState;
