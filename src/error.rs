//! Custom error types for the simulation engine.
//!
//! This module defines the primary error type, `SimError`, for the entire crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to
//! handle the different kinds of errors that can occur, from configuration
//! issues to invalid commands arriving at the dispatch boundary.
//!
//! ## Error Hierarchy
//!
//! - **`UnknownPosition`**: a demanded position name is not in the axis table.
//!   Returned synchronously; the axis state is unchanged.
//! - **`UnknownTarget`** / **`UnknownMethod`**: the dispatch boundary was asked
//!   for a target or method that does not exist.
//! - **`InvalidArgument`**: benchmark parameters that pass parsing but are
//!   logically invalid (non-positive count/interval, unknown mode number).
//! - **`SchedulingFailure`**: the underlying task/timer machinery failed. The
//!   affected run is aborted and reported; it is never retried automatically.
//! - **`Config`** / **`Configuration`**: file-level errors from the `config`
//!   crate versus semantic validation errors caught after deserialization.
//! - **`DispatcherClosed`**: a client handle outlived the dispatcher actor.
//!
//! Superseding an in-flight task is *not* an error: the dispatcher's
//! cancel-and-restart behavior resolves ownership internally.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, SimError>;

/// All errors produced by the simulation engine.
#[derive(Error, Debug)]
pub enum SimError {
    /// Demanded position name is not in the axis position table.
    #[error("Unknown position '{0}'")]
    UnknownPosition(String),

    /// No axis or benchmark target registered under this id.
    #[error("Unknown target '{0}'")]
    UnknownTarget(String),

    /// Method name not recognized at the invoke boundary.
    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    /// Semantically invalid command argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Timer/task machinery failed; the affected run was aborted.
    #[error("Scheduling failure: {0}")]
    SchedulingFailure(String),

    /// File-level configuration error (parse, missing file, bad types).
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Semantic configuration error caught during validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A client handle outlived the dispatcher actor.
    #[error("Dispatcher is no longer running")]
    DispatcherClosed,
}
