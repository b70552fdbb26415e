//! Structured representation of a value field.
//!
//! Mirrors the normative-type layout served to clients: the primary value
//! plus `display` and `control` metadata blocks. Attribute fields that are
//! associated with a subfield write through [`StructuredValue::set_subfield`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ValueError, ValueResult};
use crate::value::PointValue;

/// Every addressable subfield path.
pub const SUBFIELD_PATHS: [&str; 6] = [
    "display.limitHigh",
    "display.limitLow",
    "control.limitHigh",
    "control.limitLow",
    "display.description",
    "display.units",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMeta {
    pub limit_high: Option<f64>,
    pub limit_low: Option<f64>,
    pub description: Option<String>,
    pub units: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlMeta {
    pub limit_high: Option<f64>,
    pub limit_low: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredValue {
    pub value: PointValue,
    pub display: DisplayMeta,
    pub control: ControlMeta,
    /// Choice labels for enumerated points, empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl StructuredValue {
    pub fn new(value: PointValue) -> Self {
        Self {
            value,
            display: DisplayMeta::default(),
            control: ControlMeta::default(),
            choices: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.choices = choices;
        self
    }

    /// Replace the primary value and stamp the update time.
    pub fn set_value(&mut self, value: PointValue) {
        self.value = value;
        self.timestamp = Utc::now();
    }

    /// Write `value` at a subfield `path` (one of [`SUBFIELD_PATHS`]).
    pub fn set_subfield(&mut self, path: &str, value: &PointValue) -> ValueResult<()> {
        match path {
            "display.limitHigh" => self.display.limit_high = Some(number(path, value)?),
            "display.limitLow" => self.display.limit_low = Some(number(path, value)?),
            "control.limitHigh" => self.control.limit_high = Some(number(path, value)?),
            "control.limitLow" => self.control.limit_low = Some(number(path, value)?),
            "display.description" => self.display.description = Some(text(path, value)?),
            "display.units" => self.display.units = Some(text(path, value)?),
            _ => {
                return Err(ValueError::UnknownSubfield {
                    path: path.to_string(),
                });
            }
        }
        self.timestamp = Utc::now();
        Ok(())
    }

    /// Read a subfield back as a point value, `None` if it was never set.
    pub fn subfield(&self, path: &str) -> ValueResult<Option<PointValue>> {
        let value = match path {
            "display.limitHigh" => self.display.limit_high.map(PointValue::Float),
            "display.limitLow" => self.display.limit_low.map(PointValue::Float),
            "control.limitHigh" => self.control.limit_high.map(PointValue::Float),
            "control.limitLow" => self.control.limit_low.map(PointValue::Float),
            "display.description" => self.display.description.clone().map(PointValue::Str),
            "display.units" => self.display.units.clone().map(PointValue::Str),
            _ => {
                return Err(ValueError::UnknownSubfield {
                    path: path.to_string(),
                });
            }
        };
        Ok(value)
    }
}

fn number(path: &str, value: &PointValue) -> ValueResult<f64> {
    match value {
        PointValue::Int(_) | PointValue::Float(_) => value
            .as_f64()
            .ok_or_else(|| ValueError::validation(path, "number", value.kind_name())),
        other => Err(ValueError::validation(path, "number", other.kind_name())),
    }
}

fn text(path: &str, value: &PointValue) -> ValueResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ValueError::validation(path, "string", value.kind_name()))
}
