//! Iterative trace builder.
//!
//! A transaction is simulated through a runner contract with every contract it reaches
//! replaced by its patched image. Hooks report calls, logs and storage writes back to the
//! runner, and newly reached contracts are patched for the next round until the set of
//! contracts stops growing.

pub mod abi;
mod artifacts;
mod builder;
mod types;

pub use artifacts::{HookArtifacts, RUNNER_SOURCE};
pub use builder::{
    Tracer, TracerBuilder, DEFAULT_MAX_ROUNDS, HOOKS_ADDRESS, RUNNER_ADDRESS, TX_GAS,
};
pub use types::{CallRecord, CallType, LogRecord, StoreRecord, Trace, TxRequest};
