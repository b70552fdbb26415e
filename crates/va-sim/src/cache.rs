//! Last-known values served to readers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use va_core::PointValue;

/// Pushes cached values to whoever serves them (normally the record store).
///
/// Called with the cache lock held. Implementations, and anything they call
/// synchronously such as record subscribers, must not write to any point of
/// the same coordinator: the cache lock is not reentrant.
pub trait Publisher: Send + Sync {
    fn publish(&self, name: &str, value: &PointValue);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl Publisher for NullPublisher {
    fn publish(&self, _name: &str, _value: &PointValue) {}
}

/// Identity of a client write: its arrival order and the cycle that was
/// current when it was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStamp {
    pub seq: u64,
    pub cycle: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    value: PointValue,
    written: Option<WriteStamp>,
}

/// Name to last-known value, guarded by the cache lock.
///
/// Publication happens under the same lock as the update, so two updates of
/// one point can never publish out of order.
pub struct ValueCache {
    entries: Mutex<HashMap<String, Entry>>,
    publisher: Arc<dyn Publisher>,
}

impl ValueCache {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            publisher,
        }
    }

    pub fn get(&self, name: &str) -> Option<PointValue> {
        self.entries.lock().get(name).map(|e| e.value.clone())
    }

    /// Store `value`, publishing it first when `publish` is set.
    pub fn record(&self, name: &str, value: PointValue, publish: bool) {
        let mut entries = self.entries.lock();
        if publish {
            self.publisher.publish(name, &value);
        }
        match entries.get_mut(name) {
            Some(entry) => entry.value = value,
            None => {
                entries.insert(
                    name.to_string(),
                    Entry {
                        value,
                        written: None,
                    },
                );
            }
        }
    }

    /// Store and publish a client write.
    ///
    /// Returns `false` without touching the entry when a later write to the
    /// same point already landed.
    pub fn record_write(&self, name: &str, value: PointValue, stamp: WriteStamp) -> bool {
        let mut entries = self.entries.lock();
        if let Some(WriteStamp { seq, .. }) = entries.get(name).and_then(|e| e.written) {
            if seq > stamp.seq {
                return false;
            }
        }
        self.publisher.publish(name, &value);
        entries.insert(
            name.to_string(),
            Entry {
                value,
                written: Some(stamp),
            },
        );
        true
    }

    /// Store and publish a value read back from the model during `cycle`.
    ///
    /// Returns `false` when the point was written during or after the start
    /// of `cycle`: the model has not seen that write yet, so its readback is
    /// older than the cached value.
    pub fn refresh(&self, name: &str, value: PointValue, cycle: u64) -> bool {
        let mut entries = self.entries.lock();
        let entry = entries.entry(name.to_string()).or_insert_with(|| Entry {
            value: value.clone(),
            written: None,
        });
        if entry.written.is_some_and(|w| w.cycle >= cycle) {
            return false;
        }
        self.publisher.publish(name, &value);
        entry.value = value;
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, PointValue> {
        self.entries
            .lock()
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl Publisher for Log {
        fn publish(&self, name: &str, value: &PointValue) {
            self.0.lock().push(format!("{}={}", name, value));
        }
    }

    fn stamp(seq: u64, cycle: u64) -> WriteStamp {
        WriteStamp { seq, cycle }
    }

    #[test]
    fn publish_flag_controls_side_effect() {
        let log = Arc::new(Log::default());
        let cache = ValueCache::new(log.clone());
        cache.record("Q1", PointValue::Float(5.0), false);
        cache.record("Q2", PointValue::Int(2), true);

        assert_eq!(cache.get("Q1"), Some(PointValue::Float(5.0)));
        assert_eq!(cache.get("Q3"), None);
        assert_eq!(*log.0.lock(), ["Q2=2"]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn readback_from_the_writing_cycle_is_dropped() {
        let log = Arc::new(Log::default());
        let cache = ValueCache::new(log.clone());
        assert!(cache.record_write("Q1", PointValue::Float(5.0), stamp(1, 2)));

        // Cycle 2 was already running when the write was queued.
        assert!(!cache.refresh("Q1", PointValue::Float(0.0), 2));
        assert_eq!(cache.get("Q1"), Some(PointValue::Float(5.0)));

        // Cycle 3 applied it.
        assert!(cache.refresh("Q1", PointValue::Float(5.5), 3));
        assert_eq!(cache.get("Q1"), Some(PointValue::Float(5.5)));
        assert_eq!(*log.0.lock(), ["Q1=5", "Q1=5.5"]);
    }

    #[test]
    fn older_write_never_replaces_newer_one() {
        let cache = ValueCache::new(Arc::new(NullPublisher));
        assert!(cache.record_write("Q1", PointValue::Float(2.0), stamp(8, 1)));
        assert!(!cache.record_write("Q1", PointValue::Float(1.0), stamp(7, 1)));
        assert_eq!(cache.get("Q1"), Some(PointValue::Float(2.0)));

        // A readback keeps the stamp, so the late write still loses.
        assert!(cache.refresh("Q1", PointValue::Float(2.0), 2));
        assert!(!cache.record_write("Q1", PointValue::Float(1.0), stamp(7, 1)));
        assert_eq!(cache.get("Q1"), Some(PointValue::Float(2.0)));
    }
}
