//! va-core: stable foundation for the virtual accelerator server.
//!
//! Contains:
//! - value (closed point kinds and values, coercion)
//! - structured (structured representation of a value field)
//! - name (field name parsing)
//! - timing (evaluation timing helpers)
//! - error (shared validation errors)

pub mod error;
pub mod name;
pub mod structured;
pub mod timing;
pub mod value;

// Re-exports: nice ergonomics for downstream crates
pub use error::{ValueError, ValueResult};
pub use name::{FieldName, VALUE_SUFFIX};
pub use structured::{ControlMeta, DisplayMeta, StructuredValue, SUBFIELD_PATHS};
pub use timing::{AccumulatingTimer, Stopwatch};
pub use value::{PointKind, PointValue};
