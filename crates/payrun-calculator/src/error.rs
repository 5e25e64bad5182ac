//! Error handling for the payroll calculator work-session API.

use thiserror::Error;

/// Errors raised when starting work against a payroll calculator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalculatorError {
    /// The run was retired; completed runs accept no new calculations.
    #[error("payroll run {payroll_info_id} is completed and accepts no new calculations")]
    Completed { payroll_info_id: u64 },
}
