//! Seams between the record store and the rest of the server.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use va_core::{PointValue, StructuredValue};

/// Receives every accepted field write after the store has applied it.
///
/// Supplied at construction; the server forwards writes to the simulation
/// coordinator through it.
pub trait WriteSink: Send + Sync {
    fn on_write(&self, field: &str, value: &PointValue);
}

/// Sink that discards writes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl WriteSink for NullSink {
    fn on_write(&self, _field: &str, _value: &PointValue) {}
}

/// A value posted to a field's subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Posted {
    /// Canonical field name (`Q1` or `Q1.HOPR`).
    pub field: String,
    pub value: PointValue,
    /// Full structured value, present for value-field posts.
    pub structured: Option<StructuredValue>,
    pub timestamp: DateTime<Utc>,
}

/// Observer registered against one field.
#[derive(Clone)]
pub struct Subscriber(Arc<dyn Fn(&Posted) + Send + Sync>);

impl Subscriber {
    pub fn new(f: impl Fn(&Posted) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn notify(&self, posted: &Posted) {
        (self.0)(posted)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Subscriber(..)")
    }
}
