//! Error types for model access and evaluation coordination.

use thiserror::Error;
use va_core::ValueError;

/// Failures reported by a model adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Unknown model identifier: {name}")]
    UnknownIdentifier { name: String },

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Errors surfaced by the coordinator and its parts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Unknown point: {name}")]
    UnknownPoint { name: String },

    #[error(transparent)]
    Validation(#[from] ValueError),

    /// A model failure converted into a permanent skip of `name`.
    #[error("Point {name} omitted from evaluation: {message}")]
    Omitted { name: String, message: String },

    #[error("Model accessed from thread {caller} but owned by {owner}")]
    ConcurrencyViolation { owner: String, caller: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Thread error: {message}")]
    Thread { message: String },

    #[error("Simulation worker is not running")]
    WorkerStopped,
}

pub type SimResult<T> = Result<T, SimError>;
