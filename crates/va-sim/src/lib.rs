//! Evaluation coordination between control-point writes and a model.
//!
//! Writes are cached immediately (read-your-write) and buffered; a
//! [`DebounceTimer`] coalesces bursts into one evaluation cycle, run on a
//! single worker thread that owns the [`ModelAdapter`].

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod measurement;
pub mod model;
pub mod pending;
pub mod timer;

pub use cache::{NullPublisher, Publisher, ValueCache, WriteStamp};
pub use coordinator::{
    Coordinator, CoordinatorOptions, CoordinatorStats, DEFAULT_STATUS_POINT,
    DEFAULT_TIMEOUT_POINT,
};
pub use error::{ModelError, ModelResult, SimError, SimResult};
pub use measurement::{DEFAULT_IGNORE, MeasurementFilter};
pub use model::{ModelAdapter, ModelHost};
pub use pending::PendingWrites;
pub use timer::{DebounceTimer, TimerOptions, TimerState};
