//! TwoPhase Common Types
//!
//! This crate contains shared types used across the two-phase commit
//! transfer coordinator, including identifiers, the pending transaction
//! record, and the error taxonomy surfaced to RPC callers.

pub mod identifiers;
pub mod transaction;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use transaction::*;
pub use error::*;
pub use time::*;
