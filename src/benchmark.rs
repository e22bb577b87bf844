//! Throughput benchmark harness.
//!
//! The harness drives repeated value updates through a sink at a requested
//! interval and reports the achieved rate. One run issues `count` ticks on a
//! `tokio::time::interval`, starting immediately; each tick publishes through
//! the sink selected by the run mode. A run is a best-effort measurement, not
//! a guaranteed-delivery process: cancellation or a scheduling failure aborts
//! it without a completion record and is never retried.
//!
//! Ticks of a single run are strictly ordered (tick *k* publishes before tick
//! *k+1* starts); there is no ordering guarantee across runs on different
//! targets.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{Result, SimError};
use crate::sink::{ArraySink, CounterSink, ScalarSink};

/// What a benchmark tick publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BenchmarkMode {
    /// Publish a monotonically increasing event-sequence counter.
    EventOnly,
    /// Write the tick number to the scalar sink.
    Scalar,
    /// Copy-on-write update of slot A's array head.
    ArraySlotA,
    /// Copy-on-write update of slot B's array head.
    ArraySlotB,
}

impl TryFrom<i32> for BenchmarkMode {
    type Error = SimError;

    /// Wire encoding used at the method boundary: 0..3.
    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::EventOnly),
            1 => Ok(Self::Scalar),
            2 => Ok(Self::ArraySlotA),
            3 => Ok(Self::ArraySlotB),
            other => Err(SimError::InvalidArgument(format!(
                "unknown benchmark mode {other} (expected 0..3)"
            ))),
        }
    }
}

/// Parameters for one benchmark run.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Target the run is bound to (at most one active run per target).
    pub target_id: String,
    /// Number of ticks to issue.
    pub count: u32,
    /// Interval between ticks.
    pub interval: Duration,
    /// What each tick publishes.
    pub mode: BenchmarkMode,
}

/// Terminal record of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    /// Target the run was bound to.
    pub target_id: String,
    /// Mode the run used.
    pub mode: BenchmarkMode,
    /// Ticks completed (equals the requested count for a finished run).
    pub completed: u32,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// Elapsed time from first to last tick.
    pub elapsed: Duration,
    /// Achieved update rate, `completed / elapsed` in Hz.
    pub achieved_hz: f64,
}

/// Sinks a benchmark run can publish through.
///
/// The harness owns exclusive write access; clones of the sinks stay with the
/// caller for subscription.
#[derive(Clone)]
pub struct BenchmarkSinks {
    /// Event-sequence counter for `EventOnly` runs.
    pub events: CounterSink,
    /// Scalar slot for `Scalar` runs.
    pub scalar: ScalarSink<i64>,
    /// Array slot A.
    pub array_a: ArraySink,
    /// Array slot B.
    pub array_b: ArraySink,
}

impl BenchmarkSinks {
    /// Build the canonical sink set: zeroed scalar/counter and two arrays of
    /// `array_len` elements initialized to `0..array_len`.
    pub fn with_array_len(array_len: usize) -> Self {
        Self {
            events: CounterSink::new("bench.events"),
            scalar: ScalarSink::new("bench.scalar", 0),
            array_a: ArraySink::with_len("bench.array_a", array_len),
            array_b: ArraySink::with_len("bench.array_b", array_len),
        }
    }
}

/// Handle to an in-flight (or finished) benchmark run.
///
/// Cancellation is cooperative: the flag is checked at the start of every
/// tick, so a cancelled run performs no further writes and never produces a
/// report.
pub struct RunHandle {
    cancelled: Arc<AtomicBool>,
    completed: Arc<AtomicU32>,
    report_rx: watch::Receiver<Option<BenchmarkReport>>,
    task: JoinHandle<()>,
}

impl RunHandle {
    /// Request cancellation. Idempotent; takes effect at the next tick.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Ticks completed so far.
    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Subscribe to the terminal report (`None` until the run finishes;
    /// stays `None` forever for a cancelled run).
    pub fn subscribe_report(&self) -> watch::Receiver<Option<BenchmarkReport>> {
        self.report_rx.clone()
    }

    /// Wait for the run to end and return its report.
    ///
    /// `Ok(None)` means the run was cancelled before completing. A panicked
    /// or aborted run task surfaces as `SchedulingFailure`.
    pub async fn wait(self) -> Result<Option<BenchmarkReport>> {
        self.task
            .await
            .map_err(|e| SimError::SchedulingFailure(e.to_string()))?;
        Ok(self.report_rx.borrow().clone())
    }
}

/// Spawns and tracks benchmark runs over a fixed sink set.
pub struct BenchmarkHarness {
    sinks: BenchmarkSinks,
}

impl BenchmarkHarness {
    /// Create a harness publishing through `sinks`.
    pub fn new(sinks: BenchmarkSinks) -> Self {
        Self { sinks }
    }

    /// The harness sink set (clones share channels with the running tasks).
    pub fn sinks(&self) -> &BenchmarkSinks {
        &self.sinks
    }

    /// Validate `spec` and start a run.
    ///
    /// Fails synchronously with `InvalidArgument` for a non-positive count or
    /// interval. The at-most-one-run-per-target rule is the dispatcher's
    /// job; the harness itself only runs what it is given.
    pub fn start(&self, spec: RunSpec) -> Result<RunHandle> {
        if spec.count == 0 {
            return Err(SimError::InvalidArgument(
                "benchmark count must be > 0".to_string(),
            ));
        }
        if spec.interval.is_zero() {
            return Err(SimError::InvalidArgument(
                "benchmark interval must be > 0".to_string(),
            ));
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let completed = Arc::new(AtomicU32::new(0));
        let (report_tx, report_rx) = watch::channel(None);

        let task = tokio::spawn(run_loop(
            spec,
            self.sinks.clone(),
            Arc::clone(&cancelled),
            Arc::clone(&completed),
            report_tx,
        ));

        Ok(RunHandle {
            cancelled,
            completed,
            report_rx,
            task,
        })
    }
}

/// One benchmark run: `count` ticks at `interval`, first tick immediate.
async fn run_loop(
    spec: RunSpec,
    sinks: BenchmarkSinks,
    cancelled: Arc<AtomicBool>,
    completed: Arc<AtomicU32>,
    report_tx: watch::Sender<Option<BenchmarkReport>>,
) {
    let mut ticker = tokio::time::interval(spec.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let started_at = Utc::now();
    let started = tokio::time::Instant::now();
    info!(
        "benchmark '{}': starting {:?} run, count={}, interval={:?}",
        spec.target_id, spec.mode, spec.count, spec.interval
    );

    for _ in 0..spec.count {
        ticker.tick().await;

        if cancelled.load(Ordering::SeqCst) {
            let done = completed.load(Ordering::SeqCst);
            debug!(
                "benchmark '{}': cancelled after {done}/{} ticks",
                spec.target_id, spec.count
            );
            return;
        }

        let n = completed.fetch_add(1, Ordering::SeqCst) + 1;
        match spec.mode {
            BenchmarkMode::EventOnly => {
                sinks.events.next();
            }
            BenchmarkMode::Scalar => {
                sinks.scalar.publish(i64::from(n));
            }
            BenchmarkMode::ArraySlotA => {
                sinks.array_a.publish_head(n as i32);
            }
            BenchmarkMode::ArraySlotB => {
                sinks.array_b.publish_head(n as i32);
            }
        }
    }

    let elapsed = started.elapsed();
    let secs = elapsed.as_secs_f64().max(1e-9);
    let report = BenchmarkReport {
        target_id: spec.target_id.clone(),
        mode: spec.mode,
        completed: spec.count,
        started_at,
        elapsed,
        achieved_hz: f64::from(spec.count) / secs,
    };
    info!(
        "benchmark '{}': done, {} updates in {:.3}s ({:.0}/s, mode {:?})",
        spec.target_id, report.completed, secs, report.achieved_hz, spec.mode
    );
    if report_tx.send(Some(report)).is_err() {
        // Nobody kept a handle; the log line above is the only record.
        warn!("benchmark '{}': report dropped, no listener", spec.target_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness() -> BenchmarkHarness {
        BenchmarkHarness::new(BenchmarkSinks::with_array_len(16))
    }

    fn spec(count: u32, interval_us: u64, mode: BenchmarkMode) -> RunSpec {
        RunSpec {
            target_id: "perf".to_string(),
            count,
            interval: Duration::from_micros(interval_us),
            mode,
        }
    }

    #[test]
    fn test_mode_wire_encoding() {
        assert_eq!(BenchmarkMode::try_from(0).unwrap(), BenchmarkMode::EventOnly);
        assert_eq!(BenchmarkMode::try_from(1).unwrap(), BenchmarkMode::Scalar);
        assert_eq!(
            BenchmarkMode::try_from(2).unwrap(),
            BenchmarkMode::ArraySlotA
        );
        assert_eq!(
            BenchmarkMode::try_from(3).unwrap(),
            BenchmarkMode::ArraySlotB
        );
        assert!(BenchmarkMode::try_from(4).is_err());
        assert!(BenchmarkMode::try_from(-1).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_arguments_rejected() {
        let h = harness();
        assert!(matches!(
            h.start(spec(0, 1000, BenchmarkMode::Scalar)),
            Err(SimError::InvalidArgument(_))
        ));
        assert!(matches!(
            h.start(spec(10, 0, BenchmarkMode::Scalar)),
            Err(SimError::InvalidArgument(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scalar_run_accounting() {
        let h = harness();
        let handle = h.start(spec(1000, 1000, BenchmarkMode::Scalar)).unwrap();

        let report = handle.wait().await.unwrap().expect("run finished");
        assert_eq!(report.completed, 1000);
        assert_eq!(h.sinks().scalar.get().value, 1000);

        // Rate is consistent with the elapsed time the report carries.
        let expected = f64::from(report.completed) / report.elapsed.as_secs_f64();
        assert!((report.achieved_hz - expected).abs() < 1.0);
        // First tick fires immediately, so 1000 ticks span 999 intervals.
        assert_eq!(report.elapsed, Duration::from_micros(999_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_only_run_increments_counter() {
        let h = harness();
        let handle = h.start(spec(5, 1000, BenchmarkMode::EventOnly)).unwrap();
        let report = handle.wait().await.unwrap().expect("run finished");
        assert_eq!(report.completed, 5);
        assert_eq!(h.sinks().events.get().value, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_array_copy_on_write_run() {
        let h = harness();
        let original_len = h.sinks().array_a.len();
        let mut rx = h.sinks().array_a.subscribe();

        let checker = tokio::spawn(async move {
            let mut last_head = 0;
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                assert_eq!(snapshot.value.len(), 16);
                last_head = snapshot.value[0];
                if last_head == 5 {
                    break;
                }
            }
            last_head
        });

        let handle = h.start(spec(5, 1000, BenchmarkMode::ArraySlotA)).unwrap();
        let report = handle.wait().await.unwrap().expect("run finished");
        assert_eq!(report.completed, 5);

        let final_head = checker.await.unwrap();
        assert_eq!(final_head, 5);
        assert_eq!(h.sinks().array_a.len(), original_len);
        assert_eq!(h.sinks().array_a.snapshot()[0], 5);
        // Tail untouched.
        assert_eq!(h.sinks().array_a.snapshot()[1], 1);
        // Slot B untouched.
        assert_eq!(h.sinks().array_b.snapshot()[0], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_has_no_report() {
        let h = harness();
        let mut rx = h.sinks().scalar.subscribe();

        let handle = h
            .start(spec(1_000_000, 1000, BenchmarkMode::Scalar))
            .unwrap();

        // Let a few ticks through, then cancel.
        for _ in 0..3 {
            rx.changed().await.unwrap();
            rx.borrow_and_update();
        }
        handle.cancel();
        let completed_at_cancel = handle.completed();

        let report = handle.wait().await.unwrap();
        assert!(report.is_none());

        // No writes after the cancelled task's final tick check.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.sinks().scalar.get().value <= i64::from(completed_at_cancel) + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_run_yields_single_report() {
        let h = harness();

        let first = h
            .start(spec(1_000_000, 1000, BenchmarkMode::Scalar))
            .unwrap();
        // Cancel-then-start, as the dispatcher does on a second request.
        first.cancel();
        let second = h.start(spec(10, 1000, BenchmarkMode::Scalar)).unwrap();

        assert!(first.wait().await.unwrap().is_none());
        let report = second.wait().await.unwrap().expect("second run finished");
        assert_eq!(report.completed, 10);
    }
}
