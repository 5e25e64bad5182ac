//! Integration tests for the calculator cache retirement path.

use payrun_core::{
    CalculationSession, CalculatorCache, CalculatorError, PayrollCalculator, PayrollFrequency,
    PayrollInfo, RetireOutcome,
};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn test_calculator(id: u64) -> Arc<PayrollCalculator> {
    let info = PayrollInfo::new(
        id,
        chrono::Utc::now(),
        chrono::Utc::now() + chrono::Duration::days(14),
        PayrollFrequency::Biweekly,
    );
    Arc::new(PayrollCalculator::new(info))
}

#[test]
fn test_retirement_blocks_until_sessions_drain() {
    let cache = Arc::new(CalculatorCache::new());
    let calc = test_calculator(1);
    cache.add(1, Arc::clone(&calc));

    let first = CalculationSession::begin(&calc).expect("calculator accepts work");
    let second = CalculationSession::begin(&calc).expect("calculator accepts work");

    let (outcome_tx, outcome_rx) = mpsc::channel();
    let retire = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            let outcome = cache.suspend_and_remove(1);
            outcome_tx.send(outcome).expect("main thread is waiting");
        })
    };

    // Retirement must not finish while either session is still live, and the
    // entry must stay visible for lookups during the block.
    assert!(outcome_rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(cache.get(1).is_some());
    assert!(calc.is_completed());

    drop(first);
    assert!(outcome_rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(calc.active_calculations(), 1);

    drop(second);
    let outcome = outcome_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("retirement should finish after the last session drops");
    retire.join().expect("retirement thread panicked");

    assert_eq!(outcome, RetireOutcome::Evicted);
    assert!(cache.get(1).is_none());
    assert!(calc.is_completed());
}

#[test]
fn test_completed_calculator_refuses_work_while_draining() {
    let cache = Arc::new(CalculatorCache::new());
    let calc = test_calculator(2);
    cache.add(2, Arc::clone(&calc));

    let session = CalculationSession::begin(&calc).expect("calculator accepts work");

    let retire = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.suspend_and_remove(2))
    };

    // Let retirement set the completion flag and enter its wait
    while !calc.is_completed() {
        thread::sleep(Duration::from_millis(10));
    }

    // New work must be refused even though the entry is still registered
    assert!(cache.get(2).is_some());
    assert_eq!(
        CalculationSession::begin(&calc).unwrap_err(),
        CalculatorError::Completed { payroll_info_id: 2 }
    );

    drop(session);
    assert_eq!(
        retire.join().expect("retirement thread panicked"),
        RetireOutcome::Evicted
    );
    assert!(cache.get(2).is_none());
}

#[test]
fn test_retirements_of_distinct_runs_are_independent() {
    let cache = Arc::new(CalculatorCache::new());
    let blocked = test_calculator(1);
    let idle = test_calculator(2);
    cache.add(1, Arc::clone(&blocked));
    cache.add(2, Arc::clone(&idle));

    let session = CalculationSession::begin(&blocked).expect("calculator accepts work");

    let retire_blocked = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.suspend_and_remove(1))
    };
    while !blocked.is_completed() {
        thread::sleep(Duration::from_millis(10));
    }

    // Run 2 has no work in flight; its retirement must not queue behind the
    // drain wait on run 1.
    let retire_idle = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.suspend_and_remove(2))
    };
    assert_eq!(
        retire_idle.join().expect("idle retirement panicked"),
        RetireOutcome::Evicted
    );
    assert!(cache.get(2).is_none());
    assert!(cache.get(1).is_some());

    drop(session);
    assert_eq!(
        retire_blocked.join().expect("blocked retirement panicked"),
        RetireOutcome::Evicted
    );
    assert!(cache.get(1).is_none());
}

#[test]
fn test_forced_eviction_after_timeout_reports_degraded_outcome() {
    let cache = Arc::new(CalculatorCache::with_drain_timeout(Duration::from_millis(50)));
    let calc = test_calculator(3);
    cache.add(3, Arc::clone(&calc));

    let session = CalculationSession::begin(&calc).expect("calculator accepts work");

    let outcome = cache.suspend_and_remove(3);

    assert_eq!(outcome, RetireOutcome::EvictedAfterTimeout);
    assert!(cache.get(3).is_none());
    assert!(calc.is_completed());

    // The straggling session still finishes cleanly after the forced eviction
    drop(session);
    assert_eq!(calc.active_calculations(), 0);
}

#[test]
fn test_concurrent_lookups_and_registrations() {
    let cache = Arc::new(CalculatorCache::new());
    let mut handles = vec![];

    for thread_id in 0..4u64 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                let id = thread_id * 100 + i;
                cache.add(id, test_calculator(id));
                assert!(cache.get(id).is_some());
            }
        }));
    }
    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    assert_eq!(cache.len(), 200);
    let outcomes = cache.suspend_all();
    assert_eq!(outcomes.len(), 200);
    assert!(outcomes.iter().all(|(_, o)| *o == RetireOutcome::Evicted));
    assert!(cache.is_empty());
}
