//! Closed value model for control points.
//!
//! Every consumer (record store, cache, protocol encoder) matches these enums
//! exhaustively, so adding a kind is a compile-time visible change.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ValueError, ValueResult};

/// Kind of a control point, carrying the kind-specific shape information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointKind {
    /// Signed integer.
    Int,
    /// Double precision float.
    Float,
    /// Boolean flag.
    Bool,
    /// Free text.
    Str,
    /// Enumerated choice; values are indices into `choices`.
    Enum { choices: Vec<String> },
    /// Fixed-shape float array stored row-major.
    FloatArray { rows: usize, cols: usize },
}

impl PointKind {
    /// Short lowercase name used in logs and listings.
    pub fn name(&self) -> &'static str {
        match self {
            PointKind::Int => "int",
            PointKind::Float => "float",
            PointKind::Bool => "bool",
            PointKind::Str => "string",
            PointKind::Enum { .. } => "enum",
            PointKind::FloatArray { .. } => "float_array",
        }
    }

    /// Number of elements for array kinds.
    pub fn element_count(&self) -> Option<usize> {
        match self {
            PointKind::FloatArray { rows, cols } => Some(rows * cols),
            _ => None,
        }
    }

    /// Kind-appropriate zero value.
    pub fn zero(&self) -> PointValue {
        match self {
            PointKind::Int => PointValue::Int(0),
            PointKind::Float => PointValue::Float(0.0),
            PointKind::Bool => PointValue::Bool(false),
            PointKind::Str => PointValue::Str(String::new()),
            PointKind::Enum { .. } => PointValue::Enum(0),
            PointKind::FloatArray { rows, cols } => {
                PointValue::FloatArray(vec![0.0; rows * cols])
            }
        }
    }

    /// Validate `value` against this kind, converting where the conversion is lossless.
    ///
    /// `what` names the field being validated and only appears in the error.
    pub fn coerce(&self, what: &str, value: PointValue) -> ValueResult<PointValue> {
        let got = value.kind_name();
        let coerced = match (self, value) {
            (PointKind::Int, PointValue::Int(i)) => Some(PointValue::Int(i)),
            (PointKind::Int, PointValue::Enum(i)) => i64::try_from(i).ok().map(PointValue::Int),
            (PointKind::Int, PointValue::Bool(b)) => Some(PointValue::Int(i64::from(b))),
            (PointKind::Int, PointValue::Float(f)) => integral(f).map(PointValue::Int),

            (PointKind::Float, PointValue::Float(f)) => Some(PointValue::Float(f)),
            (PointKind::Float, PointValue::Int(i)) => Some(PointValue::Float(i as f64)),

            (PointKind::Bool, PointValue::Bool(b)) => Some(PointValue::Bool(b)),
            (PointKind::Bool, PointValue::Int(0)) => Some(PointValue::Bool(false)),
            (PointKind::Bool, PointValue::Int(1)) => Some(PointValue::Bool(true)),

            (PointKind::Str, PointValue::Str(s)) => Some(PointValue::Str(s)),

            (PointKind::Enum { choices }, PointValue::Enum(i)) => {
                (i < choices.len()).then_some(PointValue::Enum(i))
            }
            (PointKind::Enum { choices }, PointValue::Int(i)) => usize::try_from(i)
                .ok()
                .filter(|i| *i < choices.len())
                .map(PointValue::Enum),
            (PointKind::Enum { choices }, PointValue::Float(f)) => integral(f)
                .and_then(|i| usize::try_from(i).ok())
                .filter(|i| *i < choices.len())
                .map(PointValue::Enum),
            (PointKind::Enum { choices }, PointValue::Str(s)) => {
                choices.iter().position(|c| *c == s).map(PointValue::Enum)
            }

            (PointKind::FloatArray { rows, cols }, PointValue::FloatArray(data)) => {
                (data.len() == rows * cols).then_some(PointValue::FloatArray(data))
            }

            _ => None,
        };

        coerced.ok_or_else(|| ValueError::validation(what, self.describe(), got))
    }

    fn describe(&self) -> String {
        match self {
            PointKind::Enum { choices } => {
                format!("enum index < {} or one of [{}]", choices.len(), choices.join(", "))
            }
            PointKind::FloatArray { rows, cols } => {
                format!("float array of {}x{} = {} elements", rows, cols, rows * cols)
            }
            other => other.name().to_string(),
        }
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// A value held by a field.
///
/// Serialized untagged so the wire form is plain JSON/YAML. Enum indices
/// serialize as numbers; on the way back in they arrive as `Int` and are
/// turned into `Enum` by [`PointKind::coerce`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    FloatArray(Vec<f64>),
    Enum(usize),
}

impl PointValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PointValue::Bool(_) => "bool",
            PointValue::Int(_) => "int",
            PointValue::Float(_) => "float",
            PointValue::Str(_) => "string",
            PointValue::FloatArray(_) => "float_array",
            PointValue::Enum(_) => "enum",
        }
    }

    /// Numeric view of scalar values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PointValue::Int(i) => Some(*i as f64),
            PointValue::Float(f) => Some(*f),
            PointValue::Enum(i) => Some(*i as f64),
            PointValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            PointValue::Str(_) | PointValue::FloatArray(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PointValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a protocol JSON value.
    pub fn from_json(value: serde_json::Value) -> ValueResult<Self> {
        let got = value.to_string();
        serde_json::from_value(value)
            .map_err(|_| ValueError::validation("json value", "scalar or float array", got))
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PointValue::Bool(b) => serde_json::Value::from(*b),
            PointValue::Int(i) => serde_json::Value::from(*i),
            PointValue::Float(f) => serde_json::Value::from(*f),
            PointValue::Str(s) => serde_json::Value::from(s.as_str()),
            PointValue::FloatArray(data) => serde_json::Value::from(data.clone()),
            PointValue::Enum(i) => serde_json::Value::from(*i),
        }
    }
}

impl Default for PointValue {
    fn default() -> Self {
        PointValue::Float(0.0)
    }
}

impl From<f64> for PointValue {
    fn from(value: f64) -> Self {
        PointValue::Float(value)
    }
}

impl From<i64> for PointValue {
    fn from(value: i64) -> Self {
        PointValue::Int(value)
    }
}

impl From<i32> for PointValue {
    fn from(value: i32) -> Self {
        PointValue::Int(i64::from(value))
    }
}

impl From<bool> for PointValue {
    fn from(value: bool) -> Self {
        PointValue::Bool(value)
    }
}

impl From<&str> for PointValue {
    fn from(value: &str) -> Self {
        PointValue::Str(value.to_string())
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::Bool(b) => write!(f, "{}", b),
            PointValue::Int(i) => write!(f, "{}", i),
            PointValue::Float(v) => write!(f, "{}", v),
            PointValue::Str(s) => write!(f, "{:?}", s),
            PointValue::FloatArray(data) => write!(f, "[{} elements]", data.len()),
            PointValue::Enum(i) => write!(f, "enum({})", i),
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn any_value() -> impl Strategy<Value = PointValue> {
        prop_oneof![
            any::<bool>().prop_map(PointValue::Bool),
            any::<i64>().prop_map(PointValue::Int),
            (-1e6_f64..1e6_f64).prop_map(PointValue::Float),
            "[a-zA-Z]{0,8}".prop_map(PointValue::Str),
            prop::collection::vec(-10.0_f64..10.0, 0..7).prop_map(PointValue::FloatArray),
            (0_usize..6).prop_map(PointValue::Enum),
        ]
    }

    fn any_kind() -> impl Strategy<Value = PointKind> {
        prop_oneof![
            Just(PointKind::Int),
            Just(PointKind::Float),
            Just(PointKind::Bool),
            Just(PointKind::Str),
            Just(PointKind::Enum {
                choices: vec!["OUT".into(), "IN".into()]
            }),
            Just(PointKind::FloatArray { rows: 2, cols: 3 }),
        ]
    }

    proptest! {
        #[test]
        fn coerce_is_idempotent(kind in any_kind(), value in any_value()) {
            if let Ok(once) = kind.coerce("p", value) {
                let twice = kind.coerce("p", once.clone());
                prop_assert_eq!(twice, Ok(once));
            }
        }

        #[test]
        fn zero_always_validates(kind in any_kind()) {
            let zero = kind.zero();
            prop_assert_eq!(kind.coerce("p", zero.clone()), Ok(zero));
        }
    }
}
