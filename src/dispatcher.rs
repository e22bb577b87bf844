//! Command dispatcher actor.
//!
//! All command routing happens in a single async task that processes
//! [`DispatchCommand`]s from an mpsc channel. The actor owns the registry
//! mapping each target id to its active task, enforcing the single-owner
//! rule: starting a move or a benchmark run for a target first cancels
//! whatever previously owned that target, of either kind.
//!
//! The control path never suspends on running work. Every command is
//! validated, the task is started, and the ack is sent - completion is
//! observed through sink telemetry, not through the ack.
//!
//! [`DispatcherHandle`] is the cloneable client side. Besides the typed
//! methods it exposes the method-dispatch boundary used by the external tag
//! store: `invoke("setFilter", ..)` / `invoke("perfTest", ..)` with
//! wire-level arguments.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::benchmark::{BenchmarkHarness, BenchmarkMode, RunHandle, RunSpec};
use crate::error::{Result, SimError};
use crate::messages::DispatchCommand;
use crate::positioner::Positioner;

/// Argument at the `invoke` method boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodArg {
    /// Integer argument (counts, intervals, mode numbers).
    Int(i64),
    /// String argument (position names).
    Str(String),
}

impl MethodArg {
    fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Str(_) => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) => None,
        }
    }
}

/// A task currently owning a target.
enum ActiveTask {
    Move { axis: Arc<Positioner> },
    Benchmark { run: RunHandle },
}

/// Actor that owns the axes, the benchmark harness and the target registry.
pub struct CommandDispatcher {
    axes: HashMap<String, Arc<Positioner>>,
    harness: BenchmarkHarness,
    registry: HashMap<String, ActiveTask>,
}

impl CommandDispatcher {
    /// Create a dispatcher over the given axes and benchmark harness.
    pub fn new(axes: Vec<Arc<Positioner>>, harness: BenchmarkHarness) -> Self {
        let axes = axes
            .into_iter()
            .map(|a| (a.axis_id().to_string(), a))
            .collect();
        Self {
            axes,
            harness,
            registry: HashMap::new(),
        }
    }

    /// Spawn the actor event loop and return a client handle.
    pub fn spawn(self, channel_capacity: usize) -> DispatcherHandle {
        let (tx, rx) = mpsc::channel(channel_capacity);
        tokio::spawn(self.run(rx));
        DispatcherHandle { tx }
    }

    /// Run the actor event loop, processing commands until shutdown.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<DispatchCommand>) {
        info!("command dispatcher started ({} axes)", self.axes.len());

        while let Some(command) = command_rx.recv().await {
            match command {
                DispatchCommand::SetDemand {
                    axis_id,
                    position,
                    ack,
                } => {
                    let result = self.handle_set_demand(&axis_id, &position);
                    let _ = ack.send(result);
                }

                DispatchCommand::RunBenchmark {
                    target_id,
                    count,
                    interval_us,
                    mode,
                    ack,
                } => {
                    let result = self.handle_run_benchmark(&target_id, count, interval_us, mode);
                    let _ = ack.send(result);
                }

                DispatchCommand::Shutdown { ack } => {
                    info!("dispatcher shutdown requested");
                    self.cancel_all();
                    let _ = ack.send(());
                    break;
                }
            }
        }

        info!("command dispatcher stopped");
    }

    /// Route a position demand to its axis.
    ///
    /// Validation happens before the previous owner is cancelled, so a bad
    /// demand changes nothing at all.
    fn handle_set_demand(&mut self, axis_id: &str, position: &str) -> Result<bool> {
        let axis = self
            .axes
            .get(axis_id)
            .ok_or_else(|| SimError::UnknownTarget(axis_id.to_string()))?
            .clone();
        if axis.table().index_of(position).is_none() {
            return Err(SimError::UnknownPosition(position.to_string()));
        }

        self.release_target(axis_id);
        axis.set_demand(position)?;
        self.registry
            .insert(axis_id.to_string(), ActiveTask::Move { axis });
        Ok(true)
    }

    /// Validate wire-level benchmark arguments and start the run.
    fn handle_run_benchmark(
        &mut self,
        target_id: &str,
        count: i64,
        interval_us: i64,
        mode: i32,
    ) -> Result<bool> {
        let mode = BenchmarkMode::try_from(mode)?;
        if count <= 0 {
            return Err(SimError::InvalidArgument(format!(
                "benchmark count must be > 0, got {count}"
            )));
        }
        let count = u32::try_from(count)
            .map_err(|_| SimError::InvalidArgument(format!("benchmark count {count} too large")))?;
        if interval_us <= 0 {
            return Err(SimError::InvalidArgument(format!(
                "benchmark interval must be > 0 us, got {interval_us}"
            )));
        }

        self.release_target(target_id);
        let run = self.harness.start(RunSpec {
            target_id: target_id.to_string(),
            count,
            interval: Duration::from_micros(interval_us as u64),
            mode,
        })?;
        self.registry
            .insert(target_id.to_string(), ActiveTask::Benchmark { run });
        Ok(true)
    }

    /// Cancel whatever currently owns `target_id`.
    ///
    /// Superseding is not an error; it is the documented cancel-and-restart
    /// behavior.
    fn release_target(&mut self, target_id: &str) {
        if let Some(previous) = self.registry.remove(target_id) {
            match previous {
                ActiveTask::Move { axis } => {
                    debug!("superseding move on '{target_id}'");
                    axis.cancel();
                }
                ActiveTask::Benchmark { run } => {
                    debug!(
                        "superseding benchmark on '{target_id}' ({} ticks done)",
                        run.completed()
                    );
                    run.cancel();
                }
            }
        }
    }

    fn cancel_all(&mut self) {
        let targets: Vec<String> = self.registry.keys().cloned().collect();
        for target in targets {
            self.release_target(&target);
        }
    }
}

/// Cloneable client for the dispatcher actor.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<DispatchCommand>,
}

impl DispatcherHandle {
    /// Demand a named position on an axis. Acks synchronously; the move
    /// proceeds in the background.
    pub async fn set_demand(&self, axis_id: &str, position: &str) -> Result<bool> {
        let (cmd, rx) = DispatchCommand::set_demand(axis_id, position);
        self.send(cmd).await?;
        rx.await.map_err(|_| SimError::DispatcherClosed)?
    }

    /// Start a benchmark run. Acks synchronously; the run proceeds in the
    /// background.
    pub async fn run_benchmark(
        &self,
        target_id: &str,
        count: i64,
        interval_us: i64,
        mode: i32,
    ) -> Result<bool> {
        let (cmd, rx) = DispatchCommand::run_benchmark(target_id, count, interval_us, mode);
        self.send(cmd).await?;
        rx.await.map_err(|_| SimError::DispatcherClosed)?
    }

    /// Cancel all active tasks and stop the actor.
    pub async fn shutdown(&self) -> Result<()> {
        let (cmd, rx) = DispatchCommand::shutdown();
        self.send(cmd).await?;
        rx.await.map_err(|_| SimError::DispatcherClosed)
    }

    /// Method-dispatch entry point for the external tag store.
    ///
    /// `set<Axis>` methods (e.g. `setFilter`) take one string argument, the
    /// position name, and route to the axis whose id is the lowercased
    /// method suffix. `perfTest` takes `[count, delay_us, mode]` integers.
    /// Returns the boolean ack of the routed command.
    pub async fn invoke(&self, method: &str, args: &[MethodArg]) -> Result<bool> {
        if let Some(axis) = method.strip_prefix("set").filter(|s| !s.is_empty()) {
            let position = args
                .first()
                .and_then(MethodArg::as_str)
                .ok_or_else(|| {
                    SimError::InvalidArgument(format!(
                        "{method} expects one string argument, got {args:?}"
                    ))
                })?
                .to_string();
            return self.set_demand(&axis.to_lowercase(), &position).await;
        }

        if method == "perfTest" {
            let int_arg = |i: usize| {
                args.get(i).and_then(MethodArg::as_int).ok_or_else(|| {
                    SimError::InvalidArgument(format!(
                        "perfTest expects three int arguments, got {args:?}"
                    ))
                })
            };
            let count = int_arg(0)?;
            let interval_us = int_arg(1)?;
            let mode = i32::try_from(int_arg(2)?)
                .map_err(|_| SimError::InvalidArgument("perfTest mode out of range".to_string()))?;
            return self.run_benchmark("perfTest", count, interval_us, mode).await;
        }

        warn!("invoke: unknown method '{method}'");
        Err(SimError::UnknownMethod(method.to_string()))
    }

    async fn send(&self, cmd: DispatchCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SimError::DispatcherClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::BenchmarkSinks;
    use crate::positioner::AxisState;
    use crate::sink::ScalarSink;
    use crate::table::PositionTable;

    fn filter_axis() -> Arc<Positioner> {
        let table = PositionTable::from_names(&["None", "g", "r", "i"]).unwrap();
        Arc::new(Positioner::new(
            "filter",
            table,
            Duration::from_millis(100),
            ScalarSink::new("filter.index", 0),
            ScalarSink::new("filter.name", "None".to_string()),
        ))
    }

    fn engine() -> (Arc<Positioner>, BenchmarkSinks, DispatcherHandle) {
        let axis = filter_axis();
        let sinks = BenchmarkSinks::with_array_len(16);
        let dispatcher = CommandDispatcher::new(
            vec![Arc::clone(&axis)],
            BenchmarkHarness::new(sinks.clone()),
        );
        (axis, sinks, dispatcher.spawn(32))
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_demand_acks_before_arrival() {
        let (axis, _sinks, handle) = engine();

        let acked = handle.set_demand("filter", "i").await.unwrap();
        assert!(acked);
        // Ack arrived while the wheel is still moving.
        assert_eq!(axis.state(), AxisState::Moving);

        let mut rx = axis.subscribe_index();
        while axis.state() == AxisState::Moving {
            rx.changed().await.unwrap();
            rx.borrow_and_update();
        }
        assert_eq!(axis.current_index(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_errors_are_synchronous() {
        let (axis, _sinks, handle) = engine();

        assert!(matches!(
            handle.set_demand("filter", "u").await,
            Err(SimError::UnknownPosition(_))
        ));
        assert!(matches!(
            handle.set_demand("nope", "g").await,
            Err(SimError::UnknownTarget(_))
        ));
        assert_eq!(axis.state(), AxisState::Idle);

        assert!(matches!(
            handle.run_benchmark("perf", 0, 1000, 1).await,
            Err(SimError::InvalidArgument(_))
        ));
        assert!(matches!(
            handle.run_benchmark("perf", 10, -5, 1).await,
            Err(SimError::InvalidArgument(_))
        ));
        assert!(matches!(
            handle.run_benchmark("perf", 10, 1000, 9).await,
            Err(SimError::InvalidArgument(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_benchmark_supersedes_first() {
        let (_axis, sinks, handle) = engine();
        let mut scalar_rx = sinks.scalar.subscribe();

        assert!(handle.run_benchmark("perf", 1_000_000, 1000, 1).await.unwrap());
        assert!(handle.run_benchmark("perf", 5, 1000, 1).await.unwrap());

        // The superseding run restarts the tick numbering from 1 and is the
        // only writer left; wait for its terminal value.
        loop {
            scalar_rx.changed().await.unwrap();
            let v = scalar_rx.borrow_and_update().value;
            if v == 5 {
                break;
            }
        }

        // No zombie writes from the superseded run afterwards.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sinks.scalar.get().value, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_benchmark_supersedes_move_on_same_target() {
        let (axis, _sinks, handle) = engine();

        assert!(handle.set_demand("filter", "i").await.unwrap());
        assert_eq!(axis.state(), AxisState::Moving);
        let generation = axis.generation();

        // A benchmark bound to the same target takes ownership and cancels
        // the move.
        assert!(handle.run_benchmark("filter", 3, 1000, 0).await.unwrap());
        assert_eq!(axis.generation(), generation + 1);
        assert_eq!(axis.state(), AxisState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_boundary() {
        let (axis, sinks, handle) = engine();

        assert!(handle
            .invoke("setFilter", &[MethodArg::Str("r".to_string())])
            .await
            .unwrap());
        let mut rx = axis.subscribe_index();
        while axis.state() == AxisState::Moving {
            rx.changed().await.unwrap();
            rx.borrow_and_update();
        }
        assert_eq!(axis.current_index(), 2);

        assert!(handle
            .invoke(
                "perfTest",
                &[MethodArg::Int(4), MethodArg::Int(1000), MethodArg::Int(1)]
            )
            .await
            .unwrap());
        let mut scalar_rx = sinks.scalar.subscribe();
        loop {
            scalar_rx.changed().await.unwrap();
            if scalar_rx.borrow_and_update().value == 4 {
                break;
            }
        }

        assert!(matches!(
            handle.invoke("reboot", &[]).await,
            Err(SimError::UnknownMethod(_))
        ));
        assert!(matches!(
            handle.invoke("setFilter", &[MethodArg::Int(1)]).await,
            Err(SimError::InvalidArgument(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_active_tasks() {
        let (axis, _sinks, handle) = engine();

        assert!(handle.set_demand("filter", "i").await.unwrap());
        handle.shutdown().await.unwrap();
        assert_eq!(axis.state(), AxisState::Idle);

        assert!(matches!(
            handle.set_demand("filter", "g").await,
            Err(SimError::DispatcherClosed)
        ));
    }
}
