//! TwoPhase Protocol Messages
//!
//! Wire messages of the `TwoPhaseCommitServer` RPC surface. The structs
//! derive `prost::Message` directly, so any protobuf transport can carry
//! them without a code generation step.

pub mod messages;

pub use messages::*;
