//! Message types for the dispatcher actor.
//!
//! Commands carry a `oneshot` ack channel: the dispatcher validates, starts
//! the work and acks immediately. The ack never waits for a move or a
//! benchmark run to finish; completion is observed through telemetry.
//! Helper constructors return `(command, ack receiver)` pairs so callers
//! never wire the channels by hand.

use tokio::sync::oneshot;

use crate::error::Result;

/// Commands accepted by the dispatcher actor.
#[derive(Debug)]
pub enum DispatchCommand {
    /// Demand a named position on an axis.
    SetDemand {
        /// Axis to move.
        axis_id: String,
        /// Demanded position name.
        position: String,
        /// Synchronous ack: `Ok(true)` once the move (or no-op) is accepted.
        ack: oneshot::Sender<Result<bool>>,
    },

    /// Start a benchmark run against a target.
    ///
    /// Arguments are wire-level integers; the dispatcher validates them.
    RunBenchmark {
        /// Target the run is bound to.
        target_id: String,
        /// Number of ticks (> 0).
        count: i64,
        /// Tick interval in microseconds (> 0).
        interval_us: i64,
        /// Mode number, 0..3.
        mode: i32,
        /// Synchronous ack: `Ok(true)` once the run is started.
        ack: oneshot::Sender<Result<bool>>,
    },

    /// Cancel all active tasks and stop the actor.
    Shutdown {
        /// Acked after the registry is drained.
        ack: oneshot::Sender<()>,
    },
}

impl DispatchCommand {
    /// Build a `SetDemand` command and its ack receiver.
    pub fn set_demand(
        axis_id: impl Into<String>,
        position: impl Into<String>,
    ) -> (Self, oneshot::Receiver<Result<bool>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::SetDemand {
                axis_id: axis_id.into(),
                position: position.into(),
                ack: tx,
            },
            rx,
        )
    }

    /// Build a `RunBenchmark` command and its ack receiver.
    pub fn run_benchmark(
        target_id: impl Into<String>,
        count: i64,
        interval_us: i64,
        mode: i32,
    ) -> (Self, oneshot::Receiver<Result<bool>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::RunBenchmark {
                target_id: target_id.into(),
                count,
                interval_us,
                mode,
                ack: tx,
            },
            rx,
        )
    }

    /// Build a `Shutdown` command and its ack receiver.
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { ack: tx }, rx)
    }
}
