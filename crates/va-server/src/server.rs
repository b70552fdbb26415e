//! Server glue: record store in front, coordinator behind.
//!
//! ```text
//!   client write -> Coordinator (validate, pending, cache, debounce)
//!                      -> Publisher -> RecordStore::post (structured value, fan-out)
//!                      -> worker -> model set/get -> cache -> Publisher
//!   client read  -> Coordinator cache
//! ```
//!
//! The store only ever changes through the cache publisher, under the cache
//! lock, so it never disagrees with what readers are served.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};
use va_config::{ServerConfig, prefixed};
use va_core::{PointValue, StructuredValue};
use va_records::{
    FieldInfo, NullSink, RecordDatabase, RecordDescriptor, RecordStore, Subscriber,
};
use va_sim::{Coordinator, CoordinatorStats, ModelAdapter, Publisher};

use crate::error::ServerResult;

/// Mirrors every cached value into the store.
struct StorePublisher(Arc<RecordStore>);

impl Publisher for StorePublisher {
    fn publish(&self, name: &str, value: &PointValue) {
        if let Err(e) = self.0.post(name, value.clone()) {
            debug!(point = %name, error = %e, "cached value not posted");
        }
    }
}

pub struct SimServer {
    store: Arc<RecordStore>,
    coordinator: Arc<Coordinator>,
    config: ServerConfig,
}

impl SimServer {
    /// Build the records of `db` (prefixed), add the pseudo points and start
    /// the coordinator around `model`.
    ///
    /// `model` must know the prefixed names.
    pub fn start(
        db: RecordDatabase,
        model: Box<dyn ModelAdapter>,
        config: ServerConfig,
    ) -> ServerResult<Self> {
        config.validate()?;
        let db = with_pseudo_points(prefixed(db, &config.prefix), &config);

        let store = Arc::new(RecordStore::build_all(&db, Arc::new(NullSink))?);
        let mut points = IndexMap::new();
        let mut initial = BTreeMap::new();
        for field in store.catalog() {
            initial.insert(field.name.clone(), field.value);
            points.insert(field.name, field.kind);
        }

        let coordinator = Arc::new(Coordinator::start_seeded(
            model,
            points,
            initial,
            Arc::new(StorePublisher(store.clone())),
            config.coordinator_options(),
        )?);

        info!(
            records = store.len(),
            prefix = %config.prefix,
            threaded = config.threaded,
            "server started"
        );
        Ok(Self {
            store,
            coordinator,
            config,
        })
    }

    /// Build a server over `db` using a model constructed from the built store.
    pub fn start_with(
        db: RecordDatabase,
        config: ServerConfig,
        model: impl FnOnce(&RecordStore) -> Box<dyn ModelAdapter>,
    ) -> ServerResult<Self> {
        // The model sees the same prefixed names and initial values the server will serve.
        let preview_db = with_pseudo_points(prefixed(db.clone(), &config.prefix), &config);
        let preview = RecordStore::build_all(&preview_db, Arc::new(NullSink))?;
        Self::start(db, model(&preview), config)
    }

    /// Cached value of a field, logging and returning a default on failure.
    ///
    /// Unknown names read as `0.0`.
    pub fn read(&self, name: &str) -> PointValue {
        match self.try_read(name) {
            Ok(value) => value,
            Err(e) => {
                warn!(field = %name, error = %e, "read failed");
                PointValue::default()
            }
        }
    }

    pub fn try_read(&self, name: &str) -> ServerResult<PointValue> {
        let field = self.store.resolve(name)?;
        Ok(self.coordinator.read(&field)?)
    }

    /// Write a field, logging instead of failing.
    pub fn write(&self, name: &str, value: PointValue) {
        if let Err(e) = self.try_write(name, value) {
            warn!(field = %name, error = %e, "write dropped");
        }
    }

    pub fn try_write(&self, name: &str, value: PointValue) -> ServerResult<()> {
        let field = self.store.resolve(name)?;
        if self.coordinator.is_omitted(&field) {
            debug!(field = %field, "write to omitted point, model will not see it");
        }
        self.coordinator.submit_write(&field, value)?;
        Ok(())
    }

    pub fn read_structured(&self, point: &str) -> ServerResult<StructuredValue> {
        Ok(self.store.read_structured(point)?)
    }

    /// Observe a field's published values.
    ///
    /// Callbacks run under the coordinator's cache lock, on the writing
    /// client's thread or the worker. They must not write to any point of
    /// this server.
    pub fn subscribe(&self, name: &str, subscriber: Subscriber) -> ServerResult<()> {
        Ok(self.store.subscribe(name, subscriber)?)
    }

    pub fn list(&self) -> Vec<FieldInfo> {
        self.store.catalog()
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.coordinator.stats()
    }

    pub fn omitted(&self) -> Vec<String> {
        self.coordinator.omitted()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }
}

impl Drop for SimServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Add the status, timeout and reset records unless the database defines them.
fn with_pseudo_points(mut db: RecordDatabase, config: &ServerConfig) -> RecordDatabase {
    db.entry(config.status_name())
        .or_insert_with(|| RecordDescriptor::int(0));
    db.entry(config.timeout_name())
        .or_insert_with(|| RecordDescriptor::float(config.debounce_interval_s));
    if let Some(reset) = config.reset_name() {
        db.entry(reset).or_insert_with(|| RecordDescriptor::int(0));
    }
    db
}
