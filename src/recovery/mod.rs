//! Runtime fault recovery.
//!
//! Faults arrive tagged with their stage. Busy devices and vanished implementations
//! are answered by substituting the next entry of the stage's fallback chain in
//! place; decode errors are tolerated per buffer up to a threshold; everything is
//! bounded, and running out of budget moves the session to Error.

mod fault;
mod manager;

pub use fault::{Fault, FaultKind, StageLabel};
pub use manager::{RecoveryAction, RecoveryManager, RecoveryPolicy};
