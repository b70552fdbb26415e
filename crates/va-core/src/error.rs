use thiserror::Error;

pub type ValueResult<T> = Result<T, ValueError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("Validation failed for {what}: expected {expected}, got {got}")]
    Validation {
        what: String,
        expected: String,
        got: String,
    },

    #[error("Unknown subfield path: {path}")]
    UnknownSubfield { path: String },

    #[error("Invalid field name: {name}")]
    InvalidName { name: String },
}

impl ValueError {
    pub fn validation(
        what: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        ValueError::Validation {
            what: what.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }
}
