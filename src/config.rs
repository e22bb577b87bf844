//! Application configuration.
//!
//! Settings are loaded with the `config` crate: built-in defaults first, then
//! an optional TOML file on top, then a semantic validation pass. File-level
//! problems surface as `SimError::Config`; values that parse but are
//! logically wrong (duplicate axis ids, empty position tables) surface as
//! `SimError::Configuration`.
//!
//! Durations are written as humantime strings (`"500ms"`, `"1s"`).
//!
//! ```toml
//! [application]
//! log_level = "debug"
//!
//! [[axes]]
//! id = "filter"
//! positions = ["None", "g", "r", "i", "z"]
//! step_interval = "100ms"
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::table::PositionTable;

/// Built-in defaults: a filter wheel and a disperser wheel, plus the
/// canonical 10 000-element benchmark arrays.
const DEFAULT_CONFIG: &str = r#"
[application]
name = "hcd-sim"
log_level = "info"
command_channel_capacity = 32

[[axes]]
id = "filter"
positions = ["None", "g", "r", "i", "z"]
step_interval = "500ms"

[[axes]]
id = "disperser"
positions = ["Mirror", "B1200", "R831", "B600", "R150"]
step_interval = "500ms"

[benchmark]
array_len = 10000
"#;

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Application-wide settings.
    pub application: ApplicationSettings,
    /// One entry per simulated axis.
    pub axes: Vec<AxisSettings>,
    /// Benchmark harness settings.
    pub benchmark: BenchmarkSettings,
}

/// Application-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// Application name, used in logs.
    pub name: String,
    /// Default log filter when RUST_LOG is not set.
    pub log_level: String,
    /// Dispatcher command channel capacity.
    #[serde(default = "default_channel_capacity")]
    pub command_channel_capacity: usize,
}

/// Configuration of one simulated axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisSettings {
    /// Axis id; also the dispatch target id.
    pub id: String,
    /// Wheel positions in mechanical order; index 0 is the rest position.
    pub positions: Vec<String>,
    /// Delay per wheel step.
    #[serde(with = "humantime_serde", default = "default_step_interval")]
    pub step_interval: Duration,
}

impl AxisSettings {
    /// Build the axis position table.
    pub fn table(&self) -> Result<PositionTable> {
        PositionTable::new(self.positions.clone())
    }
}

/// Benchmark harness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSettings {
    /// Length of the benchmark array sinks.
    #[serde(default = "default_array_len")]
    pub array_len: usize,
}

fn default_channel_capacity() -> usize {
    32
}

fn default_step_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_array_len() -> usize {
    10_000
}

impl Settings {
    /// Load settings: defaults, then the optional `path` overlay, then
    /// validation.
    pub fn new(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()));
        }
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation beyond what deserialization checks.
    fn validate(&self) -> Result<()> {
        if self.application.command_channel_capacity == 0 {
            return Err(SimError::Configuration(
                "command_channel_capacity must be > 0".to_string(),
            ));
        }
        if self.axes.is_empty() {
            return Err(SimError::Configuration(
                "at least one axis must be configured".to_string(),
            ));
        }
        for (i, axis) in self.axes.iter().enumerate() {
            if self.axes[..i].iter().any(|a| a.id == axis.id) {
                return Err(SimError::Configuration(format!(
                    "duplicate axis id '{}'",
                    axis.id
                )));
            }
            if axis.step_interval.is_zero() {
                return Err(SimError::Configuration(format!(
                    "axis '{}': step_interval must be > 0",
                    axis.id
                )));
            }
            axis.table().map_err(|e| {
                SimError::Configuration(format!("axis '{}': {e}", axis.id))
            })?;
        }
        if self.benchmark.array_len == 0 {
            return Err(SimError::Configuration(
                "benchmark array_len must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
