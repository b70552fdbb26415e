//! Declarative record descriptors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use va_core::{PointKind, PointValue};

/// Ordered mapping of record name to descriptor.
pub type RecordDatabase = IndexMap<String, RecordDescriptor>;

/// Descriptor for one control point.
///
/// `kind` defaults to `float`. Any key other than the structural ones
/// (`kind`, `value`, `enums`, `shape`) is an attribute and must be one of the
/// names known to [`crate::Attribute::from_descriptor_key`]; this is checked
/// when the record is built, not when the file is parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordDescriptor {
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<PointValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enums: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<[usize; 2]>,
    #[serde(flatten)]
    pub attributes: IndexMap<String, PointValue>,
}

impl RecordDescriptor {
    pub fn float(value: f64) -> Self {
        Self {
            kind: Some("float".to_string()),
            value: Some(PointValue::Float(value)),
            ..Self::default()
        }
    }

    pub fn int(value: i64) -> Self {
        Self {
            kind: Some("int".to_string()),
            value: Some(PointValue::Int(value)),
            ..Self::default()
        }
    }

    pub fn enumerated<S: Into<String>>(choices: impl IntoIterator<Item = S>) -> Self {
        Self {
            kind: Some("enum".to_string()),
            enums: Some(choices.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn array(rows: usize, cols: usize) -> Self {
        Self {
            kind: Some("float".to_string()),
            shape: Some([rows, cols]),
            ..Self::default()
        }
    }

    /// Add an attribute entry (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PointValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Resolve the point kind from `kind`, `enums` and `shape`.
    pub fn point_kind(&self) -> Result<PointKind, String> {
        let kind = self.kind.as_deref().unwrap_or("float");
        if self.enums.is_some() && kind != "enum" {
            return Err(format!("'enums' is only valid for enum kind, not '{}'", kind));
        }
        if self.shape.is_some() && kind != "float" {
            return Err(format!("'shape' is only valid for float kind, not '{}'", kind));
        }

        match kind {
            "int" => Ok(PointKind::Int),
            "bool" => Ok(PointKind::Bool),
            "string" | "str" => Ok(PointKind::Str),
            "enum" => match &self.enums {
                Some(choices) if !choices.is_empty() => Ok(PointKind::Enum {
                    choices: choices.clone(),
                }),
                _ => Err("enum kind requires a non-empty 'enums' list".to_string()),
            },
            "float" => match self.shape {
                None => Ok(PointKind::Float),
                Some([rows, cols]) if rows > 0 && cols > 0 => {
                    Ok(PointKind::FloatArray { rows, cols })
                }
                Some([rows, cols]) => Err(format!("array shape {}x{} is empty", rows, cols)),
            },
            other => Err(format!("unknown kind '{}'", other)),
        }
    }
}
