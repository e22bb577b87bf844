//! Simulated hardware-control engine: slow multi-position actuators plus a
//! telemetry throughput benchmark.
//!
//! # Architecture
//!
//! The crate is built around three layers:
//!
//! - **Sinks** ([`sink`]): last-value-wins telemetry channels over
//!   `tokio::sync::watch`, with timestamps that never go backwards.
//! - **Workers** ([`positioner`], [`benchmark`]): spawned tokio tasks that
//!   step a simulated wheel toward a demanded position, or hammer a sink at a
//!   fixed rate and report the achieved throughput.
//! - **Dispatcher** ([`dispatcher`]): a single actor that owns the axes and
//!   the benchmark harness, routes commands from an mpsc channel, and
//!   enforces the one-active-task-per-target rule by cancel-and-restart.
//!
//! Commands ack synchronously once the work is started; progress and
//! completion are observed through sink subscriptions, never through the ack.

pub mod benchmark;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod messages;
pub mod positioner;
pub mod sink;
pub mod table;

pub use error::{Result, SimError};
