//! Headless simulator daemon.
//!
//! Builds the axes and the benchmark harness from configuration, spawns the
//! command dispatcher, and logs position telemetry until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;

use hcd_sim::benchmark::{BenchmarkHarness, BenchmarkSinks};
use hcd_sim::config::Settings;
use hcd_sim::dispatcher::CommandDispatcher;
use hcd_sim::positioner::Positioner;
use hcd_sim::sink::ScalarSink;

#[derive(Parser, Debug)]
#[command(name = "hcd-sim", about = "Simulated actuator and benchmark engine")]
struct Cli {
    /// Path to a TOML configuration file overlaying the built-in defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overriding both RUST_LOG and the configured level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::new(cli.config.as_deref()).context("loading configuration")?;

    let filter = cli
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| settings.application.log_level.clone());
    env_logger::Builder::new().parse_filters(&filter).init();

    info!(
        "{} starting ({} axes configured)",
        settings.application.name,
        settings.axes.len()
    );

    let mut axes = Vec::with_capacity(settings.axes.len());
    for axis_cfg in &settings.axes {
        let table = axis_cfg.table().context("building position table")?;
        let index_sink = ScalarSink::new(format!("{}.index", axis_cfg.id), table.default_index());
        let name_sink = ScalarSink::new(
            format!("{}.name", axis_cfg.id),
            table.name_at(table.default_index()).to_string(),
        );
        let axis = Arc::new(Positioner::new(
            axis_cfg.id.clone(),
            table,
            axis_cfg.step_interval,
            index_sink,
            name_sink,
        ));
        spawn_position_logger(&axis);
        axes.push(axis);
    }

    let sinks = BenchmarkSinks::with_array_len(settings.benchmark.array_len);
    spawn_benchmark_logger(&sinks);

    let dispatcher = CommandDispatcher::new(axes, BenchmarkHarness::new(sinks));
    let handle = dispatcher.spawn(settings.application.command_channel_capacity);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");
    handle.shutdown().await?;
    Ok(())
}

/// Log every position change an axis publishes.
fn spawn_position_logger(axis: &Arc<Positioner>) {
    let axis_id = axis.axis_id().to_string();
    let mut rx = axis.subscribe_name();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let update = rx.borrow_and_update().clone();
            info!(
                "axis '{axis_id}': at '{}' ({})",
                update.value, update.timestamp
            );
        }
    });
}

/// Log benchmark scalar updates at debug level.
fn spawn_benchmark_logger(sinks: &BenchmarkSinks) {
    let mut rx = sinks.scalar.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let update = rx.borrow_and_update().clone();
            log::debug!("benchmark scalar: {}", update.value);
        }
    });
}
