//! Simulated multi-position actuator axis.
//!
//! A [`Positioner`] models one slow mechanical wheel (filter, disperser)
//! stepping toward a demanded position. Demands are accepted synchronously;
//! the motion itself runs on a spawned tokio task that advances one slot per
//! step interval and publishes telemetry after every step.
//!
//! # Cancellation
//!
//! Every new demand or cancellation bumps the axis `generation` counter. The
//! stepping task captures the generation it was started with and re-checks it
//! at the start of every tick: a mismatch means the task has been superseded
//! and it exits without publishing anything further. This replaces the
//! recursive self-rescheduling timers and thread interrupts of older designs
//! with an explicit, testable state transition, and guarantees that exactly
//! the most recent task retains write authority.
//!
//! # Forward-only stepping
//!
//! The wheel only rotates forward: `current = (current + 1) % len`, even when
//! reversing would reach the demand sooner. This simulates a mechanism that
//! turns one way and is intentional, not a shortest-path controller.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::{Result, SimError};
use crate::sink::{ScalarSink, Timestamped};
use crate::table::PositionTable;

/// Axis motion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisState {
    /// At the demanded position, no step task running.
    Idle,
    /// A step task is advancing toward the demand.
    Moving,
}

/// State shared between the axis and its stepping tasks.
struct Shared {
    generation: AtomicU64,
    current: AtomicUsize,
    demand: AtomicUsize,
    moving: AtomicBool,
}

/// One simulated actuator axis.
///
/// Created once at system start and never destroyed; only the dispatcher and
/// the active step task mutate it. All mutation goes through atomics, so the
/// axis is shared as `Arc<Positioner>`.
pub struct Positioner {
    axis_id: String,
    table: PositionTable,
    step_interval: Duration,
    index_sink: ScalarSink<usize>,
    name_sink: ScalarSink<String>,
    shared: Arc<Shared>,
}

impl Positioner {
    /// Create an axis resting at the table's default position.
    ///
    /// The sinks are owned exclusively by this axis for writing; callers keep
    /// clones to subscribe.
    pub fn new(
        axis_id: impl Into<String>,
        table: PositionTable,
        step_interval: Duration,
        index_sink: ScalarSink<usize>,
        name_sink: ScalarSink<String>,
    ) -> Self {
        let start = table.default_index();
        Self {
            axis_id: axis_id.into(),
            table,
            step_interval,
            index_sink,
            name_sink,
            shared: Arc::new(Shared {
                generation: AtomicU64::new(0),
                current: AtomicUsize::new(start),
                demand: AtomicUsize::new(start),
                moving: AtomicBool::new(false),
            }),
        }
    }

    /// Axis identifier.
    pub fn axis_id(&self) -> &str {
        &self.axis_id
    }

    /// The axis position table.
    pub fn table(&self) -> &PositionTable {
        &self.table
    }

    /// Current wheel slot index.
    pub fn current_index(&self) -> usize {
        self.shared.current.load(Ordering::SeqCst)
    }

    /// Demanded wheel slot index.
    pub fn demand_index(&self) -> usize {
        self.shared.demand.load(Ordering::SeqCst)
    }

    /// Current generation counter value.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Motion state.
    pub fn state(&self) -> AxisState {
        if self.shared.moving.load(Ordering::SeqCst) {
            AxisState::Moving
        } else {
            AxisState::Idle
        }
    }

    /// Subscribe to per-step position index telemetry.
    pub fn subscribe_index(&self) -> watch::Receiver<Timestamped<usize>> {
        self.index_sink.subscribe()
    }

    /// Subscribe to per-step position name telemetry.
    pub fn subscribe_name(&self) -> watch::Receiver<Timestamped<String>> {
        self.name_sink.subscribe()
    }

    /// Demand a named position.
    ///
    /// Fails with `UnknownPosition` (and changes nothing) if `name` is not in
    /// the table. Otherwise bumps the generation, which supersedes any
    /// in-flight move, and either returns to `Idle` immediately when the
    /// wheel is already at the demand (zero publishes) or starts a stepping
    /// task carrying the new generation.
    pub fn set_demand(&self, name: &str) -> Result<()> {
        let demand = self
            .table
            .index_of(name)
            .ok_or_else(|| SimError::UnknownPosition(name.to_string()))?;

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.demand.store(demand, Ordering::SeqCst);

        let current = self.shared.current.load(Ordering::SeqCst);
        if current == demand {
            self.shared.moving.store(false, Ordering::SeqCst);
            debug!(
                "axis '{}': already at '{}' (index {}), demand is a no-op",
                self.axis_id, name, demand
            );
            return Ok(());
        }

        self.shared.moving.store(true, Ordering::SeqCst);
        info!(
            "axis '{}': moving {} -> {} ('{}', generation {})",
            self.axis_id, current, demand, name, generation
        );
        self.spawn_step_task(generation);
        Ok(())
    }

    /// Cancel any in-flight move.
    ///
    /// Bumps the generation without touching current or demand; the step task
    /// observes the mismatch on its next tick and exits without publishing.
    pub fn cancel(&self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.moving.store(false, Ordering::SeqCst);
        debug!(
            "axis '{}': cancelled (generation now {})",
            self.axis_id, generation
        );
    }

    /// Number of forward steps from the current slot to `demand`.
    pub fn steps_to(&self, demand: usize) -> usize {
        let len = self.table.len();
        (demand + len - self.current_index()) % len
    }

    fn spawn_step_task(&self, generation: u64) {
        let shared = Arc::clone(&self.shared);
        let table = self.table.clone();
        let index_sink = self.index_sink.clone();
        let name_sink = self.name_sink.clone();
        let axis_id = self.axis_id.clone();
        let step_interval = self.step_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(step_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick resolves immediately; consume it so the
            // first step lands one full step interval after the demand.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if shared.generation.load(Ordering::SeqCst) != generation {
                    debug!(
                        "axis '{axis_id}': step task (generation {generation}) superseded, exiting"
                    );
                    return;
                }

                let next = (shared.current.load(Ordering::SeqCst) + 1) % table.len();
                shared.current.store(next, Ordering::SeqCst);
                index_sink.publish(next);
                name_sink.publish(table.name_at(next).to_string());

                if next == shared.demand.load(Ordering::SeqCst) {
                    shared.moving.store(false, Ordering::SeqCst);
                    info!(
                        "axis '{axis_id}': arrived at '{}' (index {next})",
                        table.name_at(next)
                    );
                    return;
                }
            }
        });
    }
}
