#![deny(warnings)]
//! The payroll calculator object model for the payrun engine.
//!
//! This crate provides the `PayrollCalculator` work tracker used by the
//! calculation cache, the `PayrollInfo` record it reports against, and the
//! RAII `CalculationSession` guard producers hold while a calculation is in
//! flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// In-flight calculation tracking and drain coordination
pub mod calculator;
/// Error types for the work-session API
pub mod error;

/// How often a payroll run recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayrollFrequency {
    Weekly,
    Biweekly,
    SemiMonthly,
    Monthly,
}

/// The payroll run a calculator computes against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollInfo {
    /// Identifier of the payroll run, also the cache key
    pub payroll_info_id: u64,
    /// First day covered by the run
    pub period_start: DateTime<Utc>,
    /// Last day covered by the run
    pub period_end: DateTime<Utc>,
    /// Recurrence of the run
    pub frequency: PayrollFrequency,
    /// Set on retirement; a completed run accepts no new calculations
    pub completed: bool,
}

impl PayrollInfo {
    /// Create a record for a payroll run that has not yet completed.
    pub fn new(
        payroll_info_id: u64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        frequency: PayrollFrequency,
    ) -> Self {
        Self { payroll_info_id, period_start, period_end, frequency, completed: false }
    }
}

// Re-export the work-tracking types for API consumers
pub use calculator::{CalculationSession, DrainStatus, PayrollCalculator};
pub use error::CalculatorError;
