use std::path::PathBuf;

use va_records::RecordError;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid document {path}: {what}")]
    Document { path: PathBuf, what: String },

    #[error("Invalid value: {field} ({reason})")]
    InvalidValue { field: String, reason: String },

    #[error(transparent)]
    Records(#[from] RecordError),
}
