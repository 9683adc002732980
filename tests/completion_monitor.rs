// tests/completion_monitor.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::anyhow;

use buildcoord::errors::MonitorError;
use buildcoord::monitor::{CompletionMonitor, MonitorConfig};

type TestResult = Result<(), Box<dyn Error>>;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn started_monitor() -> Result<CompletionMonitor, MonitorError> {
    init_tracing();
    CompletionMonitor::started(MonitorConfig::default())
}

/// Condition returning `true` on its `n`-th call, counting calls in `calls`.
fn true_on_call(n: usize, calls: &Arc<AtomicUsize>) -> impl Fn() -> anyhow::Result<bool> + use<> {
    let calls = Arc::clone(calls);
    move || Ok(calls.fetch_add(1, Ordering::SeqCst) + 1 >= n)
}

#[tokio::test]
async fn completes_after_the_third_poll() -> TestResult {
    let monitor = started_monitor()?;
    let calls = Arc::new(AtomicUsize::new(0));

    let started = Instant::now();
    let mut handle = monitor.monitor(true_on_call(3, &calls), ms(100), ms(500))?;
    with_timeout(&mut handle).await?;
    let elapsed = started.elapsed();

    assert_eq!(handle.poll_count(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(elapsed >= ms(180), "finished too early: {elapsed:?}");
    assert!(elapsed < ms(450), "finished too late: {elapsed:?}");
    assert_eq!(monitor.active_polls(), 0);
    Ok(())
}

#[tokio::test]
async fn times_out_after_five_polls() -> TestResult {
    let monitor = started_monitor()?;

    let started = Instant::now();
    let mut handle = monitor.monitor(|| Ok(false), ms(100), ms(500))?;
    let outcome = with_timeout(&mut handle).await;
    let elapsed = started.elapsed();

    match outcome {
        Err(MonitorError::Timeout { timeout, polls }) => {
            assert_eq!(timeout, ms(500));
            assert_eq!(polls, 5);
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert_eq!(handle.poll_count(), 5);
    assert!(elapsed >= ms(480), "timed out too early: {elapsed:?}");
    assert!(elapsed < ms(900), "timed out too late: {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn hung_condition_cannot_hold_off_the_timeout() -> TestResult {
    let monitor = started_monitor()?;

    let started = Instant::now();
    let mut handle = monitor.monitor(
        || {
            std::thread::sleep(Duration::from_millis(600));
            Ok(true)
        },
        ms(100),
        ms(500),
    )?;
    let outcome = with_timeout(&mut handle).await;
    let elapsed = started.elapsed();

    assert!(matches!(outcome, Err(MonitorError::Timeout { polls: 1, .. })));
    assert_eq!(handle.poll_count(), 1);
    assert!(elapsed < ms(600), "waited for the condition: {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn condition_error_is_reported_without_retry() -> TestResult {
    let monitor = started_monitor()?;
    let calls = Arc::new(AtomicUsize::new(0));

    let handle = {
        let calls = Arc::clone(&calls);
        monitor.monitor(
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("bam"))
            },
            ms(50),
            ms(1_000),
        )?
    };

    match with_timeout(handle).await {
        Err(MonitorError::Condition(err)) => assert_eq!(err.to_string(), "bam"),
        other => panic!("expected the condition error, got {other:?}"),
    }

    tokio::time::sleep(ms(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn panicking_condition_is_reported() -> TestResult {
    let monitor = started_monitor()?;
    let handle = monitor.monitor(|| -> anyhow::Result<bool> { panic!("kaboom") }, ms(50), ms(1_000))?;

    match with_timeout(handle).await {
        Err(MonitorError::ConditionPanicked(msg)) => assert!(msg.contains("kaboom")),
        other => panic!("expected a panic report, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn cancel_is_idempotent_and_stops_polling() -> TestResult {
    let monitor = started_monitor()?;
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handle = monitor.monitor(true_on_call(usize::MAX, &calls), ms(20), ms(5_000))?;
    tokio::time::sleep(ms(100)).await;

    let canceller = handle.canceller();
    assert!(canceller.is_pending());
    assert!(handle.cancel());
    assert!(!handle.cancel());
    assert!(!canceller.cancel());
    assert!(!canceller.is_pending());

    let outcome = with_timeout(&mut handle).await;
    assert!(matches!(outcome, Err(MonitorError::Cancelled)));

    let after_cancel = calls.load(Ordering::SeqCst);
    tokio::time::sleep(ms(100)).await;
    // At most one call that was already in flight.
    assert!(calls.load(Ordering::SeqCst) <= after_cancel + 1);
    assert_eq!(monitor.active_polls(), 0);
    Ok(())
}

#[tokio::test]
async fn cancel_after_completion_is_a_no_op() -> TestResult {
    let monitor = started_monitor()?;
    let mut handle = monitor.monitor(|| Ok(true), ms(50), ms(500))?;

    with_timeout(&mut handle).await?;
    assert!(!handle.cancel());
    Ok(())
}

#[test]
fn callbacks_fire_exactly_once() -> TestResult {
    let monitor = started_monitor()?;
    let (tx, rx) = mpsc::channel();
    let calls = Arc::new(AtomicUsize::new(0));

    let ok_tx = tx.clone();
    let err_tx = tx;
    monitor.monitor_with_callbacks(
        true_on_call(2, &calls),
        ms(20),
        ms(1_000),
        move || ok_tx.send("complete").expect("receiver alive"),
        move |_err| err_tx.send("error").expect("receiver alive"),
    )?;

    assert_eq!(rx.recv_timeout(Duration::from_secs(2))?, "complete");
    assert!(rx.recv_timeout(ms(200)).is_err());
    Ok(())
}

#[test]
fn timeout_is_delivered_to_the_error_callback() -> TestResult {
    let monitor = started_monitor()?;
    let (tx, rx) = mpsc::channel();

    monitor.monitor_with_callback(|| Ok(false), ms(20), ms(150), move |outcome| {
        let _ = tx.send(outcome.map_err(|e| e.is_timeout()));
    })?;

    assert_eq!(rx.recv_timeout(Duration::from_secs(2))?, Err(true));
    Ok(())
}

#[test]
fn cancelled_registration_never_calls_back() -> TestResult {
    let monitor = started_monitor()?;
    let (tx, rx) = mpsc::channel::<&str>();

    let canceller = monitor.monitor_with_callbacks(
        || Ok(false),
        ms(20),
        ms(200),
        {
            let tx = tx.clone();
            move || {
                let _ = tx.send("complete");
            }
        },
        move |_err| {
            let _ = tx.send("error");
        },
    )?;

    assert!(canceller.cancel());
    // Well past the timeout: neither callback may run.
    assert!(rx.recv_timeout(ms(400)).is_err());
    Ok(())
}

#[test]
fn wait_blocking_returns_the_outcome() -> TestResult {
    let monitor = started_monitor()?;
    let calls = Arc::new(AtomicUsize::new(0));

    let handle = monitor.monitor(true_on_call(2, &calls), ms(20), ms(1_000))?;
    handle.wait_blocking()?;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn stop_cancels_pending_work_and_refuses_new_registrations() -> TestResult {
    let monitor = started_monitor()?;
    let (tx, rx) = mpsc::channel::<()>();

    let handle = monitor.monitor(|| Ok(false), ms(20), ms(5_000))?;
    monitor.monitor_with_callback(|| Ok(false), ms(20), ms(5_000), move |_| {
        let _ = tx.send(());
    })?;

    monitor.stop();
    assert!(!monitor.is_running());
    assert_eq!(monitor.active_polls(), 0);
    assert!(matches!(handle.wait_blocking(), Err(MonitorError::Cancelled)));
    assert!(rx.recv_timeout(ms(200)).is_err());

    let refused = monitor.monitor(|| Ok(true), ms(20), ms(100));
    assert!(matches!(refused, Err(MonitorError::NotRunning)));

    // Stopping twice is harmless, and the monitor can be restarted.
    monitor.stop();
    monitor.start()?;
    monitor.monitor(|| Ok(true), ms(20), ms(500))?.wait_blocking()?;
    Ok(())
}

#[test]
fn zero_interval_is_rejected() -> TestResult {
    let monitor = started_monitor()?;
    let result = monitor.monitor(|| Ok(true), Duration::ZERO, ms(100));
    assert!(matches!(result, Err(MonitorError::InvalidInterval)));
    Ok(())
}

#[test]
fn zero_timeout_expires_before_the_first_poll() -> TestResult {
    let monitor = started_monitor()?;
    let calls = Arc::new(AtomicUsize::new(0));

    let handle = monitor.monitor(true_on_call(1, &calls), ms(20), Duration::ZERO)?;
    let canceller = handle.canceller();
    let outcome = handle.wait_blocking();

    assert!(matches!(outcome, Err(MonitorError::Timeout { polls: 0, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!canceller.cancel());
    Ok(())
}

#[test]
fn monitors_are_independent() -> TestResult {
    let first = started_monitor()?;
    let second = CompletionMonitor::started(MonitorConfig::new().with_pool_size(1))?;

    let pending = first.monitor(|| Ok(false), ms(20), ms(5_000))?;
    second.stop();

    assert_eq!(first.active_polls(), 1);
    assert!(pending.cancel());
    first.monitor(|| Ok(true), ms(20), ms(500))?.wait_blocking()?;
    Ok(())
}

#[test]
fn many_registrations_share_a_small_pool() -> TestResult {
    init_tracing();
    let monitor = CompletionMonitor::started(MonitorConfig::new().with_pool_size(2))?;

    let handles = (0..20)
        .map(|i| {
            let calls = Arc::new(AtomicUsize::new(0));
            monitor.monitor(true_on_call(1 + i % 3, &calls), ms(10), ms(2_000))
        })
        .collect::<Result<Vec<_>, _>>()?;

    for handle in handles {
        handle.wait_blocking()?;
    }
    assert_eq!(monitor.active_polls(), 0);
    Ok(())
}

#[test]
fn queued_invocation_is_not_counted_as_a_poll() -> TestResult {
    init_tracing();
    let monitor = CompletionMonitor::started(MonitorConfig::new().with_pool_size(1))?;

    // Occupy the only blocking thread.
    let (started_tx, started_rx) = mpsc::channel();
    let started_tx = std::sync::Mutex::new(started_tx);
    let hog = monitor.monitor(
        move || {
            if let Ok(tx) = started_tx.lock() {
                let _ = tx.send(());
            }
            std::thread::sleep(Duration::from_millis(600));
            Ok(true)
        },
        ms(50),
        ms(200),
    )?;
    started_rx.recv_timeout(ms(2_000))?;

    let calls = Arc::new(AtomicUsize::new(0));
    let queued = monitor.monitor(
        {
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            }
        },
        ms(20),
        ms(150),
    )?;
    let canceller = queued.canceller();
    let outcome = queued.wait_blocking();
    assert!(
        matches!(outcome, Err(MonitorError::Timeout { polls: 0, .. })),
        "got {outcome:?}"
    );

    assert!(matches!(hog.wait_blocking(), Err(MonitorError::Timeout { polls: 1, .. })));

    // The stale invocation runs once the thread frees up and is skipped.
    std::thread::sleep(ms(600));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!canceller.cancel());
    Ok(())
}
