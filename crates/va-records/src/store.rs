//! Record store: construction, field writes, association and fan-out.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};
use va_core::{FieldName, PointKind, PointValue, StructuredValue};

use crate::attribute::Attribute;
use crate::descriptor::{RecordDatabase, RecordDescriptor};
use crate::error::{RecordError, RecordResult};
use crate::sink::{Posted, Subscriber, WriteSink};

/// Addressable slot inside one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Slot {
    Value,
    Attribute(Attribute),
}

/// One entry of [`RecordStore::catalog`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub kind: PointKind,
    pub value: PointValue,
}

/// Consistent view of a record: value field and every attribute, taken
/// under one lock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSnapshot {
    pub value: StructuredValue,
    pub attributes: BTreeMap<String, PointValue>,
}

struct RecordState {
    value: StructuredValue,
    attributes: BTreeMap<Attribute, PointValue>,
}

struct Record {
    name: String,
    kind: PointKind,
    declared: Vec<Attribute>,
    state: Mutex<RecordState>,
    /// Held across apply and fan-out so posts reach subscribers in write order.
    post_lock: Mutex<()>,
    subscribers: RwLock<BTreeMap<Slot, Vec<Subscriber>>>,
}

impl Record {
    fn build(name: &str, descriptor: &RecordDescriptor) -> RecordResult<Self> {
        if name.is_empty() || name.contains('.') {
            return Err(RecordError::construction(
                name,
                "record names must be non-empty and contain no '.'",
            ));
        }

        let kind = descriptor
            .point_kind()
            .map_err(|reason| RecordError::construction(name, reason))?;
        let initial = match &descriptor.value {
            Some(v) => kind
                .coerce(name, v.clone())
                .map_err(|e| RecordError::construction(name, e.to_string()))?,
            None => kind.zero(),
        };
        let choices = match &kind {
            PointKind::Enum { choices } => choices.clone(),
            _ => Vec::new(),
        };
        let mut value = StructuredValue::new(initial).with_choices(choices);

        let mut attributes = BTreeMap::new();
        let mut declared = Vec::new();
        for (key, raw) in &descriptor.attributes {
            let attr = Attribute::from_descriptor_key(key).ok_or_else(|| {
                RecordError::construction(name, format!("unknown attribute '{}'", key))
            })?;
            let field = format!("{}.{}", name, attr.suffix());
            let v = attr
                .kind()
                .coerce(&field, raw.clone())
                .map_err(|e| RecordError::construction(name, e.to_string()))?;
            if let Some(path) = attr.association() {
                value
                    .set_subfield(path, &v)
                    .map_err(|e| RecordError::construction(name, e.to_string()))?;
            }
            if attributes.insert(attr, v).is_some() {
                return Err(RecordError::construction(
                    name,
                    format!("attribute '{}' given more than once", attr.suffix()),
                ));
            }
            declared.push(attr);
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            declared,
            state: Mutex::new(RecordState { value, attributes }),
            post_lock: Mutex::new(()),
            subscribers: RwLock::new(BTreeMap::new()),
        })
    }

    fn slot(&self, field: &FieldName) -> Option<Slot> {
        match field.attribute_suffix() {
            None => Some(Slot::Value),
            Some(suffix) => Attribute::from_suffix(suffix)
                .filter(|attr| self.declared.contains(attr))
                .map(Slot::Attribute),
        }
    }

    fn field_name(&self, slot: Slot) -> String {
        match slot {
            Slot::Value => self.name.clone(),
            Slot::Attribute(attr) => format!("{}.{}", self.name, attr.suffix()),
        }
    }

    fn kind_of(&self, slot: Slot) -> PointKind {
        match slot {
            Slot::Value => self.kind.clone(),
            Slot::Attribute(attr) => attr.kind(),
        }
    }

    /// Validate, store, write through associations and fan out.
    fn apply(&self, slot: Slot, value: PointValue) -> RecordResult<PointValue> {
        let _order = self.post_lock.lock();
        let (stored, posts) = {
            let mut state = self.state.lock();
            self.store(&mut state, slot, value)?
        };
        self.fan_out(&posts);
        Ok(stored)
    }

    fn store(
        &self,
        state: &mut RecordState,
        slot: Slot,
        value: PointValue,
    ) -> RecordResult<(PointValue, Vec<(Slot, Posted)>)> {
        let now = Utc::now();
        match slot {
            Slot::Value => {
                let value = self.kind.coerce(&self.name, value)?;
                state.value.set_value(value.clone());
                Ok((value, vec![self.value_post(state, now)]))
            }
            Slot::Attribute(attr) => {
                let field = self.field_name(slot);
                let value = attr.kind().coerce(&field, value)?;
                // Parent first: a failed write-through leaves both untouched.
                if let Some(path) = attr.association() {
                    state.value.set_subfield(path, &value)?;
                }
                state.attributes.insert(attr, value.clone());

                let mut posts = vec![(
                    slot,
                    Posted {
                        field,
                        value: value.clone(),
                        structured: None,
                        timestamp: now,
                    },
                )];
                if attr.association().is_some() {
                    posts.push(self.value_post(state, now));
                }
                Ok((value, posts))
            }
        }
    }

    fn value_post(&self, state: &RecordState, timestamp: DateTime<Utc>) -> (Slot, Posted) {
        (
            Slot::Value,
            Posted {
                field: self.name.clone(),
                value: state.value.value.clone(),
                structured: Some(state.value.clone()),
                timestamp,
            },
        )
    }

    fn fan_out(&self, posts: &[(Slot, Posted)]) {
        let subscribers = self.subscribers.read();
        for (slot, posted) in posts {
            let Some(list) = subscribers.get(slot) else {
                continue;
            };
            trace!(field = %posted.field, count = list.len(), "fan-out");
            for subscriber in list {
                subscriber.notify(posted);
            }
        }
    }

    fn read(&self, slot: Slot) -> PointValue {
        let state = self.state.lock();
        match slot {
            Slot::Value => state.value.value.clone(),
            Slot::Attribute(attr) => state
                .attributes
                .get(&attr)
                .cloned()
                .unwrap_or_else(|| attr.kind().zero()),
        }
    }
}

/// Typed control points built from descriptors.
///
/// Records are added only during startup (`&mut self`); afterwards the store
/// is shared immutably and every field operation takes `&self`.
pub struct RecordStore {
    records: IndexMap<String, Record>,
    sink: Arc<dyn WriteSink>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("records", &self.records.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    pub fn new(sink: Arc<dyn WriteSink>) -> Self {
        Self {
            records: IndexMap::new(),
            sink,
        }
    }

    /// Build every record of `db`, in order.
    pub fn build_all(db: &RecordDatabase, sink: Arc<dyn WriteSink>) -> RecordResult<Self> {
        let mut store = Self::new(sink);
        for (name, descriptor) in db {
            store.build(name, descriptor)?;
        }
        debug!(records = store.len(), "record store built");
        Ok(store)
    }

    /// Materialize one record: a value field plus one field per attribute.
    pub fn build(&mut self, name: &str, descriptor: &RecordDescriptor) -> RecordResult<()> {
        if self.records.contains_key(name) {
            return Err(RecordError::construction(name, "duplicate record name"));
        }
        let record = Record::build(name, descriptor)?;
        self.records.insert(name.to_string(), record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_point(&self, point: &str) -> bool {
        self.records.contains_key(point)
    }

    /// Point names in construction order.
    pub fn point_names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    fn locate(&self, name: &str) -> RecordResult<(&Record, Slot)> {
        let unknown = || RecordError::UnknownField {
            name: name.to_string(),
        };
        let field = FieldName::parse(name).map_err(|_| unknown())?;
        let record = self.records.get(field.point()).ok_or_else(unknown)?;
        let slot = record.slot(&field).ok_or_else(unknown)?;
        Ok((record, slot))
    }

    /// Canonical name of an existing field (`Q1.VAL` -> `Q1`, `Q1.hopr` -> `Q1.HOPR`).
    pub fn resolve(&self, name: &str) -> RecordResult<String> {
        let (record, slot) = self.locate(name)?;
        Ok(record.field_name(slot))
    }

    pub fn kind_of(&self, name: &str) -> RecordResult<PointKind> {
        let (record, slot) = self.locate(name)?;
        Ok(record.kind_of(slot))
    }

    /// Write a field and forward the write to the sink.
    pub fn write(&self, name: &str, value: PointValue) -> RecordResult<()> {
        let (record, slot) = self.locate(name)?;
        let stored = record.apply(slot, value)?;
        let field = record.field_name(slot);
        debug!(field = %field, value = %stored, "field write");
        self.sink.on_write(&field, &stored);
        Ok(())
    }

    /// Store and fan out a value without forwarding it to the sink.
    pub fn post(&self, name: &str, value: PointValue) -> RecordResult<()> {
        let (record, slot) = self.locate(name)?;
        record.apply(slot, value)?;
        Ok(())
    }

    pub fn read(&self, name: &str) -> RecordResult<PointValue> {
        let (record, slot) = self.locate(name)?;
        Ok(record.read(slot))
    }

    pub fn read_structured(&self, point: &str) -> RecordResult<StructuredValue> {
        Ok(self.snapshot(point)?.value)
    }

    pub fn snapshot(&self, point: &str) -> RecordResult<RecordSnapshot> {
        let (record, _) = self.locate(point)?;
        let state = record.state.lock();
        Ok(RecordSnapshot {
            value: state.value.clone(),
            attributes: state
                .attributes
                .iter()
                .map(|(attr, v)| (attr.suffix().to_string(), v.clone()))
                .collect(),
        })
    }

    /// Register an observer for a field.
    ///
    /// Subscribers run synchronously on the writing thread while the record's
    /// ordering lock is held, so they must not write back into the same
    /// record. When the store is fed by a cache publisher, the caller also
    /// holds the cache lock, and a subscriber must not write to any point
    /// served through that cache.
    pub fn subscribe(&self, name: &str, subscriber: Subscriber) -> RecordResult<()> {
        let (record, slot) = self.locate(name)?;
        record
            .subscribers
            .write()
            .entry(slot)
            .or_default()
            .push(subscriber);
        Ok(())
    }

    /// Every field with its kind and current value, value fields first per record.
    pub fn catalog(&self) -> Vec<FieldInfo> {
        let mut out = Vec::new();
        for record in self.records.values() {
            let state = record.state.lock();
            out.push(FieldInfo {
                name: record.name.clone(),
                kind: record.kind.clone(),
                value: state.value.value.clone(),
            });
            for attr in &record.declared {
                out.push(FieldInfo {
                    name: record.field_name(Slot::Attribute(*attr)),
                    kind: attr.kind(),
                    value: state
                        .attributes
                        .get(attr)
                        .cloned()
                        .unwrap_or_else(|| attr.kind().zero()),
                });
            }
        }
        out
    }
}
