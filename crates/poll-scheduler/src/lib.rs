//! Adaptive Telemetry Poll Scheduler
//!
//! Decides which telemetry categories are due on each tick, fetches them
//! with bounded concurrency and fail-fast semantics, and publishes the
//! merged snapshot.

mod assembler;
mod cadence;
mod runner;

pub use assembler::{AssemblerConfig, SnapshotAssembler, TickError, TickOutcome};
pub use cadence::{Cadence, CadenceState, DEFAULT_FULL_REFRESH_ITERATIONS};
pub use runner::{run_bounded, RunError};
