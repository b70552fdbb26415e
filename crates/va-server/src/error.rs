//! Error types for the server layer.

/// Wraps the errors of the crates the server glues together.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] va_config::ConfigError),

    #[error("Record error: {0}")]
    Records(#[from] va_records::RecordError),

    #[error("Simulation error: {0}")]
    Sim(#[from] va_sim::SimError),

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
