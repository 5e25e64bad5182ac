//! Work tracking for in-flight payroll calculations.
//!
//! A `PayrollCalculator` counts the calculations currently running against a
//! payroll run. One mutex guards both the run's completion flag and the
//! active count; a condition variable paired with that mutex signals when the
//! count falls to zero, which is what the cache's retirement path waits on.

use crate::PayrollInfo;
use crate::error::CalculatorError;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Calculator state guarded by the drain lock.
#[derive(Debug)]
struct TrackerState {
    info: PayrollInfo,
    active_calculations: usize,
}

/// Outcome of waiting for a calculator's active calculations to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// Every in-flight calculation finished before the deadline.
    Drained,
    /// The deadline expired with calculations still in flight.
    TimedOut,
}

/// Tracks the in-flight calculations for one payroll run.
///
/// The completion flag and the active count live behind a single mutex, so a
/// retirement that sets the flag and a producer that wants to start work can
/// never interleave between flag-set and count-check.
#[derive(Debug)]
pub struct PayrollCalculator {
    state: Mutex<TrackerState>,
    drained: Condvar,
}

impl PayrollCalculator {
    /// Create a tracker for the given payroll run with no work in flight.
    pub fn new(info: PayrollInfo) -> Self {
        Self {
            state: Mutex::new(TrackerState { info, active_calculations: 0 }),
            drained: Condvar::new(),
        }
    }

    // Critical sections under `state` never panic, so a poisoned lock only
    // means some thread died outside of them; the state is still consistent
    // and retirement must keep working.
    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Identifier of the payroll run this calculator serves.
    pub fn payroll_info_id(&self) -> u64 {
        self.lock_state().info.payroll_info_id
    }

    /// Snapshot of the payroll run record.
    pub fn info(&self) -> PayrollInfo {
        self.lock_state().info.clone()
    }

    /// Number of calculations currently in flight.
    pub fn active_calculations(&self) -> usize {
        self.lock_state().active_calculations
    }

    /// Whether the run has been marked completed.
    pub fn is_completed(&self) -> bool {
        self.lock_state().info.completed
    }

    /// Mark the run completed so no further calculation can start.
    pub fn mark_completed(&self) {
        self.lock_state().info.completed = true;
    }

    /// Block until every in-flight calculation finishes or `timeout` elapses.
    ///
    /// Sets the completion flag under the lock before examining the active
    /// count, then waits in a predicate loop so spurious wakeups are
    /// harmless. Idempotent: draining an already-completed calculator with no
    /// active work returns immediately.
    pub fn wait_for_drain(&self, timeout: Duration) -> DrainStatus {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();
        state.info.completed = true;

        while state.active_calculations > 0 {
            let now = Instant::now();
            if now >= deadline {
                return DrainStatus::TimedOut;
            }
            let (guard, wait) = self
                .drained
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            if wait.timed_out() && state.active_calculations > 0 {
                return DrainStatus::TimedOut;
            }
        }

        DrainStatus::Drained
    }

    fn finish_calculation(&self) {
        let mut state = self.lock_state();
        state.active_calculations = state.active_calculations.saturating_sub(1);
        debug!(
            payroll_info_id = state.info.payroll_info_id,
            active = state.active_calculations,
            "calculation finished"
        );
        if state.active_calculations == 0 {
            self.drained.notify_all();
        }
    }
}

/// RAII guard for one in-flight calculation.
///
/// Dropping the session decrements the calculator's active count under the
/// drain lock and wakes any waiting retirement once the count reaches zero.
/// The decrement runs even when the calculation body panics, so a crashed
/// worker cannot leave a retirement blocked forever.
#[derive(Debug)]
pub struct CalculationSession {
    calculator: Arc<PayrollCalculator>,
}

impl CalculationSession {
    /// Start a calculation against `calculator`.
    ///
    /// Fails once the run is completed: the flag is checked under the same
    /// lock the retirement path sets it under, so no session can slip in
    /// between the flag being set and the drain wait beginning.
    pub fn begin(calculator: &Arc<PayrollCalculator>) -> Result<Self, CalculatorError> {
        let mut state = calculator.lock_state();
        if state.info.completed {
            return Err(CalculatorError::Completed {
                payroll_info_id: state.info.payroll_info_id,
            });
        }
        state.active_calculations += 1;
        debug!(
            payroll_info_id = state.info.payroll_info_id,
            active = state.active_calculations,
            "calculation started"
        );
        drop(state);

        Ok(Self { calculator: Arc::clone(calculator) })
    }

    /// The calculator this session runs against.
    pub fn calculator(&self) -> &PayrollCalculator {
        &self.calculator
    }
}

impl Drop for CalculationSession {
    fn drop(&mut self) {
        self.calculator.finish_calculation();
    }
}
