use core::fmt;

use crate::error::{ValueError, ValueResult};

/// Suffix that addresses the value field explicitly (`POINT.VAL`).
pub const VALUE_SUFFIX: &str = "VAL";

/// Parsed field address: a point name plus an optional attribute suffix.
///
/// - `Q1` and `Q1.VAL` address the value field of `Q1`
/// - `Q1.HOPR` addresses the `HOPR` attribute of `Q1`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldName {
    point: String,
    attribute: Option<String>,
}

impl FieldName {
    pub fn value(point: impl Into<String>) -> Self {
        Self {
            point: point.into(),
            attribute: None,
        }
    }

    pub fn attribute(point: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            point: point.into(),
            attribute: Some(attribute.into()),
        }
    }

    /// Split on the last `.`; attribute suffixes are matched case-insensitively.
    pub fn parse(name: &str) -> ValueResult<Self> {
        let invalid = || ValueError::InvalidName {
            name: name.to_string(),
        };
        match name.rsplit_once('.') {
            None if name.is_empty() => Err(invalid()),
            None => Ok(Self::value(name)),
            Some((point, suffix)) => {
                if point.is_empty() || suffix.is_empty() {
                    return Err(invalid());
                }
                let suffix = suffix.to_ascii_uppercase();
                if suffix == VALUE_SUFFIX {
                    Ok(Self::value(point))
                } else {
                    Ok(Self::attribute(point, suffix))
                }
            }
        }
    }

    pub fn point(&self) -> &str {
        &self.point
    }

    pub fn attribute_suffix(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    pub fn is_value(&self) -> bool {
        self.attribute.is_none()
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attr) => write!(f, "{}.{}", self.point, attr),
            None => write!(f, "{}", self.point),
        }
    }
}

impl fmt::Debug for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldName({})", self)
    }
}
