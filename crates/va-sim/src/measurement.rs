//! Measurement set selection.

/// Name fragments that mark setpoints, limits and status flags.
pub const DEFAULT_IGNORE: [&str; 15] = [
    "BMAX",
    "BMIN",
    "BDES",
    "BCON",
    "ArraySize0_RBV",
    "ArraySize1_RBV",
    "RESOLUTION",
    "ENB",
    "BST",
    "MODE",
    "ENABLE",
    "SIMULATE",
    "REQ",
    "CTRL",
    "TMIT",
];

/// Decides which points are refreshed from the model after every cycle.
///
/// A point is a measurement unless its name contains `.` (attribute fields)
/// or any of the ignore fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementFilter {
    ignore: Vec<String>,
}

impl Default for MeasurementFilter {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE)
    }
}

impl MeasurementFilter {
    pub fn new<S: Into<String>>(ignore: impl IntoIterator<Item = S>) -> Self {
        Self {
            ignore: ignore.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_measurement(&self, name: &str) -> bool {
        !name.contains('.') && !self.ignore.iter().any(|frag| name.contains(frag.as_str()))
    }

    pub fn select<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        names
            .into_iter()
            .filter(|n| self.is_measurement(n))
            .map(str::to_string)
            .collect()
    }
}
