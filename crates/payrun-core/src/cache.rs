//! Keyed cache of live payroll calculators with drain-before-evict retirement.
//!
//! Producers register a calculator under its payroll run id, look it up while
//! feeding it work, and finally retire it. Retirement marks the run completed
//! so no new calculation can start, waits for the in-flight calculations to
//! drain, then evicts the entry.

use payrun_calculator::{DrainStatus, PayrollCalculator};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default bound on how long a retirement waits for in-flight calculations.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a [`CalculatorCache::suspend_and_remove`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireOutcome {
    /// No calculator was registered under the key; the cache is unchanged.
    NotFound,
    /// Every in-flight calculation drained and the entry was removed.
    Evicted,
    /// The drain wait timed out; the entry was removed with work still in
    /// flight.
    EvictedAfterTimeout,
}

/// Cache of live payroll calculators keyed by payroll run id.
///
/// One mutex guards the map for all structural operations. The map lock is
/// never held across a drain wait; only the per-calculator lock guards the
/// wait, so retirements of distinct runs proceed in parallel.
#[derive(Debug)]
pub struct CalculatorCache {
    calculators: Mutex<HashMap<u64, Arc<PayrollCalculator>>>,
    drain_timeout: Duration,
}

impl CalculatorCache {
    /// Create a cache with the default drain timeout.
    pub fn new() -> Self {
        Self::with_drain_timeout(DEFAULT_DRAIN_TIMEOUT)
    }

    /// Create a cache whose retirements wait at most `drain_timeout` for
    /// in-flight calculations before forcing eviction.
    pub fn with_drain_timeout(drain_timeout: Duration) -> Self {
        Self { calculators: Mutex::new(HashMap::new()), drain_timeout }
    }

    // Map critical sections never panic; recover from poisoning so one
    // crashed thread cannot wedge every later lookup.
    fn lock_map(&self) -> MutexGuard<'_, HashMap<u64, Arc<PayrollCalculator>>> {
        self.calculators.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the calculator for a payroll run.
    ///
    /// Pure lookup with no side effects. An entry being retired stays visible
    /// until its drain finishes and the eviction lands.
    pub fn get(&self, payroll_info_id: u64) -> Option<Arc<PayrollCalculator>> {
        self.lock_map().get(&payroll_info_id).cloned()
    }

    /// Register a calculator under a payroll run id.
    ///
    /// A calculator already registered under the key is replaced; last write
    /// wins.
    #[instrument(skip(self, calculator))]
    pub fn add(&self, payroll_info_id: u64, calculator: Arc<PayrollCalculator>) {
        debug!(payroll_info_id, "registering payroll calculator");
        self.lock_map().insert(payroll_info_id, calculator);
    }

    /// Retire the calculator for a payroll run and remove it from the cache.
    ///
    /// Marks the run completed so no new calculation can start, waits for the
    /// in-flight calculations to drain (bounded by the cache's drain
    /// timeout), then evicts the entry. Eviction is forced even when the wait
    /// times out, but the degraded path is reported as a distinct outcome.
    /// Retiring an unknown run is a no-op.
    #[instrument(skip(self))]
    pub fn suspend_and_remove(&self, payroll_info_id: u64) -> RetireOutcome {
        let Some(calculator) = self.get(payroll_info_id) else {
            debug!(payroll_info_id, "no calculator registered, nothing to retire");
            return RetireOutcome::NotFound;
        };

        // The completion flag goes up under the calculator's own lock before
        // the active count is examined, so no session can start in between.
        let status = calculator.wait_for_drain(self.drain_timeout);

        let mut map = self.lock_map();
        // Only evict the calculator that was drained; a concurrent overwrite
        // of the key registered a different one that must stay.
        if map
            .get(&payroll_info_id)
            .is_some_and(|current| Arc::ptr_eq(current, &calculator))
        {
            map.remove(&payroll_info_id);
        }
        drop(map);

        match status {
            DrainStatus::Drained => {
                info!(payroll_info_id, "payroll calculator retired");
                RetireOutcome::Evicted
            }
            DrainStatus::TimedOut => {
                warn!(
                    payroll_info_id,
                    active = calculator.active_calculations(),
                    "drain wait timed out, evicting with calculations in flight"
                );
                RetireOutcome::EvictedAfterTimeout
            }
        }
    }

    /// Retire every registered calculator.
    ///
    /// Shutdown helper for the composition root. Runs are retired one at a
    /// time in unspecified order; each retirement is bounded by the cache's
    /// drain timeout.
    #[instrument(skip(self))]
    pub fn suspend_all(&self) -> Vec<(u64, RetireOutcome)> {
        let ids: Vec<u64> = self.lock_map().keys().copied().collect();
        info!(count = ids.len(), "retiring all payroll calculators");
        ids.into_iter().map(|id| (id, self.suspend_and_remove(id))).collect()
    }

    /// Number of registered calculators.
    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    /// Whether the cache holds no calculators.
    pub fn is_empty(&self) -> bool {
        self.lock_map().is_empty()
    }
}

impl Default for CalculatorCache {
    fn default() -> Self {
        Self::new()
    }
}
