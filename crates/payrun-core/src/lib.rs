#![deny(warnings)]
//! Core functionality for the payrun calculation engine.
//!
//! This crate provides the calculator cache that owns every live payroll
//! calculator, keyed by payroll run, with a drain-before-evict retirement
//! path: retiring a run marks its calculator completed, waits for in-flight
//! calculations to finish, then removes the entry.

use tracing::{debug, instrument};

/// Keyed cache of live payroll calculators
pub mod cache;

// Re-export critical types for API consumers
pub use cache::{CalculatorCache, DEFAULT_DRAIN_TIMEOUT, RetireOutcome};
pub use payrun_calculator::{
    CalculationSession, CalculatorError, DrainStatus, PayrollCalculator, PayrollFrequency,
    PayrollInfo,
};

/// Initialize the core engine components
#[instrument]
pub fn init() -> anyhow::Result<()> {
    debug!("Initializing payrun core");
    Ok(())
}
