//! Typed record store for control points.
//!
//! A record is one control point: a value field holding a structured value
//! plus attribute fields (limits, units, description, precision) built from a
//! declarative descriptor.
//!
//! # Write path
//!
//! A field write validates the value against the field kind, stores it,
//! writes associated attributes through to the parent's structured value,
//! fans the new value out to subscribers in subscription order, and finally
//! forwards the write to the [`WriteSink`] supplied at construction.
//!
//! Reads never leave the store.

pub mod attribute;
pub mod descriptor;
pub mod error;
pub mod sink;
pub mod store;

pub use attribute::Attribute;
pub use descriptor::{RecordDatabase, RecordDescriptor};
pub use error::{RecordError, RecordResult};
pub use sink::{NullSink, Posted, Subscriber, WriteSink};
pub use store::{FieldInfo, RecordSnapshot, RecordStore};
