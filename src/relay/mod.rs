//! Relay orchestration: the [`main_cycle::MainCycle`] state machine and startup errors

pub mod error;
pub mod main_cycle;

pub use error::RelayError;
pub use main_cycle::{CycleState, CycleStats, MainCycle};
