//! Simulation coordinator: the only path to the model.
//!
//! # Locks
//!
//! - cache lock ([`ValueCache`]): last-known values and their publication
//! - pending lock: the write buffer, wake/shutdown flags and cycle counters,
//!   with two condition variables (`wake` for the worker, `done` for callers
//!   waiting on a cycle in synchronous mode)
//!
//! No thread ever holds both. The omission set has its own lock and is never
//! taken while either of the others is held.
//!
//! # Cycle
//!
//! The worker owns the [`ModelHost`]. Each cycle swaps out the pending
//! buffer, applies every write with its own `set` call, then reads back the
//! measurement set with one batched `get`, falling back to per-point `get`
//! when the batch fails. Any model failure for a point adds it to the
//! omission set for the rest of the process.
//!
//! A write queued while cycle `n` runs is stamped with `n`; the readback of
//! cycle `n` skips it, since the model only sees the write in cycle `n + 1`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};
use va_core::{AccumulatingTimer, PointKind, PointValue, Stopwatch, ValueError};

use crate::cache::{Publisher, ValueCache, WriteStamp};
use crate::error::{SimError, SimResult};
use crate::measurement::MeasurementFilter;
use crate::model::{ModelAdapter, ModelHost};
use crate::pending::PendingWrites;
use crate::timer::{DebounceTimer, TimerOptions};

/// Default name of the evaluation trigger / status point.
pub const DEFAULT_STATUS_POINT: &str = "VIRT:BEAM:SIMULATE";
/// Default name of the debounce interval point.
pub const DEFAULT_TIMEOUT_POINT: &str = "VIRT:BEAM:SIMULATE_TIMEOUT";

const LIVENESS_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Debounced background evaluation; `false` evaluates before `submit_write` returns.
    pub threaded: bool,
    pub interval: Duration,
    /// Writes force an immediate cycle; reads report 1 while a cycle runs.
    pub status_point: String,
    /// Writes set the debounce interval in seconds.
    pub timeout_point: String,
    pub filter: MeasurementFilter,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            threaded: true,
            interval: Duration::ZERO,
            status_point: DEFAULT_STATUS_POINT.to_string(),
            timeout_point: DEFAULT_TIMEOUT_POINT.to_string(),
            filter: MeasurementFilter::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinatorStats {
    /// Completed cycles, the seeding cycle included.
    pub cycles: u64,
    /// Model `set` calls that succeeded.
    pub writes_applied: u64,
    pub omitted: usize,
    pub measurements: usize,
    pub interval: Duration,
    pub last_eval: Duration,
    pub average_eval: Duration,
}

#[derive(Default)]
struct PendingState {
    writes: PendingWrites,
    wake: bool,
    shutdown: bool,
    /// Cycles started / finished; the seeding cycle is number 1.
    started: u64,
    completed: u64,
    /// Client writes accepted so far.
    accepted: u64,
}

struct Shared {
    pending: Mutex<PendingState>,
    wake: Condvar,
    done: Condvar,
    cache: ValueCache,
    omitted: RwLock<BTreeSet<String>>,
    kinds: IndexMap<String, PointKind>,
    status_point: String,
    timeout_point: String,
    interval_ns: AtomicU64,
    alive: AtomicBool,
    cycles: AtomicU64,
    writes_applied: AtomicU64,
    eval_time: AccumulatingTimer,
    measurements: usize,
}

impl Shared {
    fn seed(&self, initial: BTreeMap<String, PointValue>) {
        for (name, value) in initial {
            let Some(kind) = self.kinds.get(&name) else {
                debug!(point = %name, "initial value for unknown point ignored");
                continue;
            };
            match kind.coerce(&name, value) {
                Ok(value) => self.cache.record(&name, value, false),
                Err(e) => debug!(point = %name, error = %e, "initial value not cached"),
            }
        }
    }

    fn is_omitted(&self, name: &str) -> bool {
        self.omitted.read().contains(name)
    }

    fn omit(&self, name: &str, cause: &SimError) {
        let omission = SimError::Omitted {
            name: name.to_string(),
            message: cause.to_string(),
        };
        if self.omitted.write().insert(name.to_string()) {
            warn!(point = %name, error = %omission, "model failure, point omitted");
        }
    }
}

/// Marks the worker dead however it exits, so waiting callers do not hang.
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.alive.store(false, Ordering::SeqCst);
        let _pending = self.0.pending.lock();
        self.0.done.notify_all();
        debug!("simulation worker stopped");
    }
}

pub struct Coordinator {
    shared: Arc<Shared>,
    threaded: bool,
    timer: Option<DebounceTimer>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Spawn the worker, seed the cache from the model and return.
    ///
    /// `points` lists every known point with its kind; the measurement set is
    /// the subset accepted by `options.filter`, minus the pseudo points.
    pub fn start(
        model: Box<dyn ModelAdapter>,
        points: IndexMap<String, PointKind>,
        publisher: Arc<dyn Publisher>,
        options: CoordinatorOptions,
    ) -> SimResult<Self> {
        Self::start_seeded(model, points, BTreeMap::new(), publisher, options)
    }

    /// Like [`Coordinator::start`], caching `initial` values first.
    ///
    /// Initial values are not published; the seeding cycle then overwrites
    /// the measurements with what the model reports.
    pub fn start_seeded(
        model: Box<dyn ModelAdapter>,
        points: IndexMap<String, PointKind>,
        initial: BTreeMap<String, PointValue>,
        publisher: Arc<dyn Publisher>,
        options: CoordinatorOptions,
    ) -> SimResult<Self> {
        let measurements: Vec<String> = options
            .filter
            .select(points.keys().map(String::as_str))
            .into_iter()
            .filter(|n| *n != options.status_point && *n != options.timeout_point)
            .collect();

        let shared = Arc::new(Shared {
            pending: Mutex::new(PendingState::default()),
            wake: Condvar::new(),
            done: Condvar::new(),
            cache: ValueCache::new(publisher),
            omitted: RwLock::new(BTreeSet::new()),
            kinds: points,
            status_point: options.status_point,
            timeout_point: options.timeout_point,
            interval_ns: AtomicU64::new(duration_ns(options.interval)),
            alive: AtomicBool::new(true),
            cycles: AtomicU64::new(0),
            writes_applied: AtomicU64::new(0),
            eval_time: AccumulatingTimer::new(),
            measurements: measurements.len(),
        });
        shared.seed(initial);

        let worker = Worker {
            host: ModelHost::new(model),
            shared: shared.clone(),
            measurements,
        };
        let handle = thread::Builder::new()
            .name("va-sim-worker".to_string())
            .spawn(move || worker.run())
            .map_err(|e| SimError::Thread {
                message: e.to_string(),
            })?;

        let timer = if options.threaded {
            let wake = shared.clone();
            let timer = DebounceTimer::new(
                TimerOptions {
                    interval: options.interval,
                    periodic: true,
                    manual: true,
                },
                move || {
                    let mut pending = wake.pending.lock();
                    if !pending.writes.is_empty() {
                        pending.wake = true;
                        wake.wake.notify_one();
                    }
                },
            );
            timer.start()?;
            Some(timer)
        } else {
            None
        };

        let coordinator = Self {
            shared,
            threaded: options.threaded,
            timer,
            worker: Mutex::new(Some(handle)),
        };
        coordinator.wait_for_cycle(1)?;
        info!(
            points = coordinator.shared.kinds.len(),
            measurements = coordinator.shared.measurements,
            threaded = coordinator.threaded,
            "simulation coordinator started"
        );
        Ok(coordinator)
    }

    /// Accept a write: queue it for the model, then cache and publish it.
    pub fn submit_write(&self, name: &str, value: PointValue) -> SimResult<()> {
        let kind = self
            .shared
            .kinds
            .get(name)
            .ok_or_else(|| SimError::UnknownPoint {
                name: name.to_string(),
            })?;
        let value = kind.coerce(name, value)?;

        if name == self.shared.timeout_point {
            let interval = interval_from(name, &value)?;
            self.shared.cache.record(name, value, true);
            self.set_interval(interval);
            return Ok(());
        }

        if name == self.shared.status_point {
            self.ensure_running()?;
            self.shared.cache.record(name, value, true);
            debug!("evaluation triggered");
            let target = self.wake();
            if let Some(timer) = &self.timer {
                timer.cancel();
            }
            if !self.threaded {
                self.wait_for_cycle(target)?;
            }
            return Ok(());
        }

        let stamp = {
            let mut pending = self.shared.pending.lock();
            if pending.shutdown {
                return Err(SimError::WorkerStopped);
            }
            pending.writes.insert(name, value.clone());
            pending.accepted += 1;
            WriteStamp {
                seq: pending.accepted,
                cycle: pending.started,
            }
        };
        if !self.shared.cache.record_write(name, value, stamp) {
            trace!(point = %name, "superseded by a later write");
        }

        match &self.timer {
            Some(timer) => timer.reset(),
            None => {
                let target = self.wake();
                self.wait_for_cycle(target)?;
            }
        }
        Ok(())
    }

    fn ensure_running(&self) -> SimResult<()> {
        if self.shared.pending.lock().shutdown {
            return Err(SimError::WorkerStopped);
        }
        Ok(())
    }

    /// Wake the worker and return the number of the cycle it will run next.
    fn wake(&self) -> u64 {
        let mut pending = self.shared.pending.lock();
        pending.wake = true;
        self.shared.wake.notify_one();
        pending.started + 1
    }

    /// Block until cycle number `target` has completed.
    fn wait_for_cycle(&self, target: u64) -> SimResult<()> {
        let mut pending = self.shared.pending.lock();
        while pending.completed < target {
            if pending.shutdown || !self.shared.alive.load(Ordering::SeqCst) {
                return Err(SimError::WorkerStopped);
            }
            self.shared.done.wait_for(&mut pending, LIVENESS_POLL);
        }
        Ok(())
    }

    /// Last-known value of a point, or its kind's zero if never cached.
    pub fn read(&self, name: &str) -> SimResult<PointValue> {
        if let Some(value) = self.shared.cache.get(name) {
            return Ok(value);
        }
        self.shared
            .kinds
            .get(name)
            .map(PointKind::zero)
            .ok_or_else(|| SimError::UnknownPoint {
                name: name.to_string(),
            })
    }

    pub fn set_interval(&self, interval: Duration) {
        self.shared
            .interval_ns
            .store(duration_ns(interval), Ordering::Relaxed);
        if let Some(timer) = &self.timer {
            timer.set_interval(interval);
        }
        debug!(interval_s = interval.as_secs_f64(), "debounce interval changed");
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.shared.interval_ns.load(Ordering::Relaxed))
    }

    pub fn is_threaded(&self) -> bool {
        self.threaded
    }

    pub fn is_omitted(&self, name: &str) -> bool {
        self.shared.is_omitted(name)
    }

    pub fn omitted(&self) -> Vec<String> {
        self.shared.omitted.read().iter().cloned().collect()
    }

    pub fn stats(&self) -> CoordinatorStats {
        let timing = &self.shared.eval_time;
        CoordinatorStats {
            cycles: self.shared.cycles.load(Ordering::Relaxed),
            writes_applied: self.shared.writes_applied.load(Ordering::Relaxed),
            omitted: self.shared.omitted.read().len(),
            measurements: self.shared.measurements,
            interval: self.interval(),
            last_eval: timing.last(),
            average_eval: timing.average(),
        }
    }

    /// Stop the timer and the worker. Writes still pending are dropped.
    pub fn shutdown(&self) {
        {
            let mut pending = self.shared.pending.lock();
            if pending.shutdown {
                return;
            }
            pending.shutdown = true;
            self.shared.wake.notify_all();
            self.shared.done.notify_all();
        }
        if let Some(timer) = &self.timer {
            timer.shutdown();
        }
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("simulation worker panicked");
            }
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    host: ModelHost,
    shared: Arc<Shared>,
    measurements: Vec<String>,
}

impl Worker {
    fn run(mut self) {
        let _guard = ExitGuard(self.shared.clone());
        debug!("simulation worker started");

        self.shared.pending.lock().started = 1;
        self.cycle(1, Vec::new());

        loop {
            let (generation, batch) = {
                let mut pending = self.shared.pending.lock();
                while !pending.wake && !pending.shutdown {
                    self.shared.wake.wait(&mut pending);
                }
                if pending.shutdown {
                    break;
                }
                pending.wake = false;
                pending.started += 1;
                (pending.started, pending.writes.take())
            };
            self.cycle(generation, batch);
        }
    }

    fn cycle(&mut self, generation: u64, batch: Vec<(String, PointValue)>) {
        let watch = Stopwatch::start();
        let status = self.shared.status_point.clone();
        self.shared.cache.record(&status, PointValue::Int(1), true);

        let size = batch.len();
        let applied = self.apply(batch);
        self.refresh(generation);

        self.shared.cache.record(&status, PointValue::Int(0), true);
        let elapsed = watch.elapsed();
        self.shared.eval_time.record(elapsed);
        self.shared.cycles.fetch_add(1, Ordering::Relaxed);
        self.shared
            .writes_applied
            .fetch_add(applied, Ordering::Relaxed);
        info!(
            cycle = generation,
            batch = size,
            applied,
            elapsed_s = elapsed.as_secs_f64(),
            "evaluation cycle complete"
        );

        self.shared.pending.lock().completed = generation;
        self.shared.done.notify_all();
    }

    /// Apply writes in order; failures omit the point and the batch goes on.
    fn apply(&mut self, batch: Vec<(String, PointValue)>) -> u64 {
        let mut applied = 0;
        for (name, value) in batch {
            if self.shared.is_omitted(&name) {
                debug!(point = %name, "skipping write to omitted point");
                continue;
            }
            let single = BTreeMap::from([(name.clone(), value)]);
            match self.host.set(&single) {
                Ok(()) => applied += 1,
                Err(e @ SimError::ConcurrencyViolation { .. }) => {
                    error!(point = %name, error = %e, "model set rejected");
                }
                Err(e) => self.shared.omit(&name, &e),
            }
        }
        applied
    }

    /// Read the measurement set back into the cache.
    fn refresh(&mut self, generation: u64) {
        let names: Vec<String> = self
            .measurements
            .iter()
            .filter(|n| !self.shared.is_omitted(n))
            .cloned()
            .collect();
        if names.is_empty() {
            return;
        }

        match self.host.get(&names) {
            Ok(mut values) => {
                for name in &names {
                    let result = values.remove(name);
                    self.accept(name, result, generation);
                }
            }
            Err(e @ SimError::ConcurrencyViolation { .. }) => {
                error!(error = %e, "model get rejected");
            }
            Err(e) => {
                debug!(error = %e, "batched get failed, reading points one by one");
                for name in &names {
                    match self.host.get(std::slice::from_ref(name)) {
                        Ok(mut values) => {
                            let result = values.remove(name);
                            self.accept(name, result, generation);
                        }
                        Err(e) => self.shared.omit(name, &e),
                    }
                }
            }
        }
    }

    fn accept(&self, name: &str, value: Option<PointValue>, generation: u64) {
        let Some(value) = value else {
            self.shared.omit(
                name,
                &SimError::UnknownPoint {
                    name: name.to_string(),
                },
            );
            return;
        };
        let coerced = match self.shared.kinds.get(name) {
            Some(kind) => kind.coerce(name, value).map_err(SimError::from),
            None => Ok(value),
        };
        match coerced {
            Ok(value) => {
                if !self.shared.cache.refresh(name, value, generation) {
                    trace!(point = %name, "readback older than pending write, skipped");
                }
            }
            Err(e) => self.shared.omit(name, &e),
        }
    }
}

fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

fn interval_from(name: &str, value: &PointValue) -> SimResult<Duration> {
    value
        .as_f64()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(|| {
            SimError::Validation(ValueError::validation(
                name,
                "non-negative seconds",
                value.to_string(),
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_rejects_negative_and_non_finite() {
        assert_eq!(
            interval_from("T", &PointValue::Float(0.25)).unwrap(),
            Duration::from_millis(250)
        );
        assert!(interval_from("T", &PointValue::Float(-1.0)).is_err());
        assert!(interval_from("T", &PointValue::Float(f64::NAN)).is_err());
        assert!(interval_from("T", &PointValue::from("soon")).is_err());
    }
}
