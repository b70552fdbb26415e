//! Fixed attribute tables.
//!
//! Two static mappings drive record construction:
//! - descriptor key -> canonical field suffix (`displayHigh` -> `HOPR`)
//! - field suffix -> subfield path in the parent's structured value
//!   (`HOPR` -> `display.limitHigh`)

use va_core::PointKind;

/// Attribute fields a record may carry besides its value field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Precision,
    Units,
    Description,
    DisplayHigh,
    DisplayLow,
    ControlHigh,
    ControlLow,
}

impl Attribute {
    pub const ALL: [Attribute; 7] = [
        Attribute::Precision,
        Attribute::Units,
        Attribute::Description,
        Attribute::DisplayHigh,
        Attribute::DisplayLow,
        Attribute::ControlHigh,
        Attribute::ControlLow,
    ];

    /// Map a descriptor key to an attribute.
    ///
    /// Accepts the descriptor names (`unitsLabel`, `displayHigh`, ...) and the
    /// short record-field spellings (`egu`, `hopr`, ...), case-insensitively.
    pub fn from_descriptor_key(key: &str) -> Option<Self> {
        let attr = match key.to_ascii_lowercase().as_str() {
            "precision" | "prec" => Attribute::Precision,
            "unitslabel" | "unit" | "units" | "egu" => Attribute::Units,
            "description" | "desc" => Attribute::Description,
            "displayhigh" | "hopr" => Attribute::DisplayHigh,
            "displaylow" | "lopr" => Attribute::DisplayLow,
            "controlhigh" | "drvh" => Attribute::ControlHigh,
            "controllow" | "drvl" => Attribute::ControlLow,
            _ => return None,
        };
        Some(attr)
    }

    /// Canonical field suffix (`POINT.SUFFIX`).
    pub fn suffix(self) -> &'static str {
        match self {
            Attribute::Precision => "PREC",
            Attribute::Units => "EGU",
            Attribute::Description => "DESC",
            Attribute::DisplayHigh => "HOPR",
            Attribute::DisplayLow => "LOPR",
            Attribute::ControlHigh => "DRVH",
            Attribute::ControlLow => "DRVL",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.suffix().eq_ignore_ascii_case(suffix))
    }

    /// Declared kind of the attribute field.
    pub fn kind(self) -> PointKind {
        match self {
            Attribute::Precision => PointKind::Int,
            Attribute::Units | Attribute::Description => PointKind::Str,
            Attribute::DisplayHigh
            | Attribute::DisplayLow
            | Attribute::ControlHigh
            | Attribute::ControlLow => PointKind::Float,
        }
    }

    /// Subfield of the parent value this attribute writes through to.
    pub fn association(self) -> Option<&'static str> {
        match self {
            Attribute::DisplayHigh => Some("display.limitHigh"),
            Attribute::DisplayLow => Some("display.limitLow"),
            Attribute::ControlHigh => Some("control.limitHigh"),
            Attribute::ControlLow => Some("control.limitLow"),
            Attribute::Description => Some("display.description"),
            Attribute::Units => Some("display.units"),
            Attribute::Precision => None,
        }
    }
}
