use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use va_core::{PointKind, PointValue};
use va_sim::{
    Coordinator, CoordinatorOptions, ModelAdapter, ModelError, ModelResult, NullPublisher,
    Publisher, SimError,
};

const STATUS: &str = "VIRT:BEAM:SIMULATE";
const TIMEOUT: &str = "VIRT:BEAM:SIMULATE_TIMEOUT";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Set(BTreeMap<String, PointValue>),
    Get(Vec<String>),
}

/// Shared view of everything the instrumented model saw.
#[derive(Default)]
struct Journal {
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    overlaps: AtomicUsize,
    threads: Mutex<HashSet<ThreadId>>,
}

impl Journal {
    fn sets(&self) -> Vec<BTreeMap<String, PointValue>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Set(v) => Some(v.clone()),
                Call::Get(_) => None,
            })
            .collect()
    }

    fn sets_of(&self, name: &str) -> usize {
        self.sets().iter().filter(|s| s.contains_key(name)).count()
    }
}

/// Model that mirrors `:BCTRL` into `:BACT`, rejects sets to `BAD:*` and
/// records every call.
struct Instrumented {
    journal: Arc<Journal>,
    values: BTreeMap<String, PointValue>,
    get_delay: Duration,
}

impl Instrumented {
    fn new(journal: Arc<Journal>, names: &[&str]) -> Self {
        Self {
            journal,
            values: names
                .iter()
                .map(|n| (n.to_string(), PointValue::Float(0.0)))
                .collect(),
            get_delay: Duration::ZERO,
        }
    }

    fn enter(&self, call: Call) {
        if self.journal.in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
            self.journal.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.journal.threads.lock().insert(thread::current().id());
        self.journal.calls.lock().push(call);
    }

    fn leave(&self) {
        self.journal.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ModelAdapter for Instrumented {
    fn get(&mut self, names: &[String]) -> ModelResult<BTreeMap<String, PointValue>> {
        self.enter(Call::Get(names.to_vec()));
        thread::sleep(self.get_delay);
        let result = names
            .iter()
            .map(|n| match self.values.get(n) {
                Some(v) => Ok((n.clone(), v.clone())),
                None => Err(ModelError::UnknownIdentifier { name: n.clone() }),
            })
            .collect();
        self.leave();
        result
    }

    fn set(&mut self, values: &BTreeMap<String, PointValue>) -> ModelResult<()> {
        self.enter(Call::Set(values.clone()));
        let mut result = Ok(());
        for (name, value) in values {
            if name.starts_with("BAD:") || !self.values.contains_key(name) {
                result = Err(ModelError::InvalidValue {
                    name: name.clone(),
                    message: "rejected".into(),
                });
                break;
            }
            self.values.insert(name.clone(), value.clone());
            if let Some(stem) = name.strip_suffix(":BCTRL") {
                self.values.insert(format!("{}:BACT", stem), value.clone());
            }
        }
        self.leave();
        result
    }
}

const MODEL_POINTS: [&str; 9] = [
    "Q1", "Q1:BCTRL", "Q1:BACT", "P1", "P2", "P3", "P4", "P5", "BAD:X",
];

fn catalog(extra: &[&str]) -> IndexMap<String, PointKind> {
    let mut points: IndexMap<String, PointKind> = MODEL_POINTS
        .iter()
        .chain(extra)
        .map(|n| (n.to_string(), PointKind::Float))
        .collect();
    points.insert(STATUS.to_string(), PointKind::Int);
    points.insert(TIMEOUT.to_string(), PointKind::Float);
    points
}

fn start(model: Instrumented, threaded: bool, interval: Duration) -> Coordinator {
    start_with(model, catalog(&[]), Arc::new(NullPublisher), threaded, interval)
}

fn start_with(
    model: Instrumented,
    points: IndexMap<String, PointKind>,
    publisher: Arc<dyn Publisher>,
    threaded: bool,
    interval: Duration,
) -> Coordinator {
    Coordinator::start(
        Box::new(model),
        points,
        publisher,
        CoordinatorOptions {
            threaded,
            interval,
            ..CoordinatorOptions::default()
        },
    )
    .unwrap()
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn start_seeds_cache_from_measurements() {
    let journal = Arc::new(Journal::default());
    let mut model = Instrumented::new(journal.clone(), &MODEL_POINTS);
    model.values.insert("Q1:BACT".into(), PointValue::Float(1.5));
    let coord = start(model, true, Duration::from_secs(10));

    assert_eq!(coord.read("Q1:BACT").unwrap(), PointValue::Float(1.5));
    assert_eq!(coord.stats().cycles, 1);
    let calls = journal.calls.lock();
    let Call::Get(names) = &calls[0] else {
        panic!("seeding should start with a get");
    };
    // Setpoints and the pseudo points are not measurements.
    assert!(names.contains(&"Q1:BACT".to_string()));
    assert!(!names.contains(&"Q1:BCTRL".to_string()));
    assert!(!names.iter().any(|n| n.contains("SIMULATE")));
}

#[test]
fn read_your_write_before_evaluation() {
    let journal = Arc::new(Journal::default());
    let coord = start(
        Instrumented::new(journal.clone(), &MODEL_POINTS),
        true,
        Duration::from_secs(10),
    );

    coord.submit_write("Q1", PointValue::Float(5.0)).unwrap();

    assert_eq!(coord.read("Q1").unwrap(), PointValue::Float(5.0));
    assert!(journal.sets().is_empty());
}

#[test]
fn quad_write_reaches_model_once() {
    let journal = Arc::new(Journal::default());
    let coord = start(
        Instrumented::new(journal.clone(), &MODEL_POINTS),
        true,
        Duration::from_millis(20),
    );

    coord.submit_write("Q1", PointValue::Float(5.0)).unwrap();
    assert_eq!(coord.read("Q1").unwrap(), PointValue::Float(5.0));

    assert!(wait_until(|| coord.stats().cycles >= 2));
    thread::sleep(Duration::from_millis(60));
    assert_eq!(
        journal.sets(),
        [BTreeMap::from([("Q1".to_string(), PointValue::Float(5.0))])]
    );
    assert_eq!(coord.read("Q1").unwrap(), PointValue::Float(5.0));
}

#[test]
fn burst_of_writes_coalesces_into_one_cycle() {
    let journal = Arc::new(Journal::default());
    let coord = start(
        Instrumented::new(journal.clone(), &MODEL_POINTS),
        true,
        Duration::from_millis(80),
    );

    for (i, name) in ["P1", "P2", "P3", "P4", "P5"].into_iter().enumerate() {
        coord
            .submit_write(name, PointValue::Float(i as f64))
            .unwrap();
        thread::sleep(Duration::from_millis(10));
    }

    assert!(wait_until(|| coord.stats().cycles >= 2));
    thread::sleep(Duration::from_millis(200));
    let stats = coord.stats();
    assert_eq!(stats.cycles, 2);
    assert_eq!(stats.writes_applied, 5);

    let sets: Vec<String> = journal
        .sets()
        .into_iter()
        .flat_map(|s| s.into_keys())
        .collect();
    assert_eq!(sets, ["P1", "P2", "P3", "P4", "P5"]);
}

#[test]
fn concurrent_writers_never_overlap_model_calls() {
    let owned: Vec<String> = (0..8).map(|t| format!("W{}", t)).collect();
    let extra: Vec<&str> = owned.iter().map(String::as_str).collect();
    let names: Vec<&str> = MODEL_POINTS.iter().copied().chain(extra.clone()).collect();

    let journal = Arc::new(Journal::default());
    let coord = Arc::new(start_with(
        Instrumented::new(journal.clone(), &names),
        catalog(&extra),
        Arc::new(NullPublisher),
        true,
        Duration::from_millis(1),
    ));

    let writers: Vec<_> = (0..8)
        .map(|t| {
            let coord = coord.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    let shared = ["P1", "P2", "P3", "P4", "P5"][(t + i) % 5];
                    let value = PointValue::Float((t * 100 + i) as f64);
                    coord.submit_write(shared, value.clone()).unwrap();
                    coord.submit_write(&format!("W{}", t), value).unwrap();
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    coord.submit_write(STATUS, PointValue::Int(1)).unwrap();

    // Every writer's last value reaches the model and stays readable.
    let last_set = |name: &str| {
        journal
            .sets()
            .iter()
            .rev()
            .find_map(|s| s.get(name).cloned())
    };
    for (t, name) in owned.iter().enumerate() {
        let expected = PointValue::Float((t * 100 + 49) as f64);
        assert!(
            wait_until(|| last_set(name) == Some(expected.clone())),
            "{} never reached the model",
            name
        );
        assert_eq!(coord.read(name).unwrap(), expected);
    }
    assert!(wait_until(|| journal.in_flight.load(Ordering::SeqCst) == 0
        && coord.read(STATUS) == Ok(PointValue::Int(0))));

    // Shared points end on whichever write came last, in cache and model alike.
    for name in ["P1", "P2", "P3", "P4", "P5"] {
        assert_eq!(last_set(name), Some(coord.read(name).unwrap()));
    }

    assert_eq!(journal.overlaps.load(Ordering::SeqCst), 0);
    let threads = journal.threads.lock();
    assert_eq!(threads.len(), 1);
    assert!(!threads.contains(&thread::current().id()));
}

#[test]
fn failing_point_is_omitted_for_good() {
    let journal = Arc::new(Journal::default());
    let coord = start(
        Instrumented::new(journal.clone(), &MODEL_POINTS),
        true,
        Duration::from_millis(10),
    );

    coord.submit_write("BAD:X", PointValue::Float(1.0)).unwrap();
    assert!(wait_until(|| coord.is_omitted("BAD:X")));
    assert_eq!(coord.omitted(), ["BAD:X"]);

    let cycles = coord.stats().cycles;
    coord.submit_write("BAD:X", PointValue::Float(2.0)).unwrap();
    coord.submit_write("P1", PointValue::Float(7.0)).unwrap();
    assert!(wait_until(|| coord.stats().cycles > cycles));
    thread::sleep(Duration::from_millis(40));

    assert_eq!(journal.sets_of("BAD:X"), 1);
    assert_eq!(journal.sets_of("P1"), 1);
    // The omitted point keeps serving its last cached value.
    assert_eq!(coord.read("BAD:X").unwrap(), PointValue::Float(2.0));
    let last_get = journal
        .calls
        .lock()
        .iter()
        .rev()
        .find_map(|c| match c {
            Call::Get(names) => Some(names.clone()),
            Call::Set(_) => None,
        })
        .unwrap();
    assert!(!last_get.contains(&"BAD:X".to_string()));
}

#[test]
fn unknown_model_identifier_only_omits_that_point() {
    let journal = Arc::new(Journal::default());
    let coord = start_with(
        Instrumented::new(journal.clone(), &MODEL_POINTS),
        catalog(&["GHOST:BACT"]),
        Arc::new(NullPublisher),
        true,
        Duration::from_secs(10),
    );

    assert_eq!(coord.omitted(), ["GHOST:BACT"]);
    assert_eq!(coord.read("GHOST:BACT").unwrap(), PointValue::Float(0.0));
    assert_eq!(coord.read("Q1:BACT").unwrap(), PointValue::Float(0.0));
    assert_eq!(coord.stats().omitted, 1);
}

#[test]
fn synchronous_write_returns_after_refresh() {
    let journal = Arc::new(Journal::default());
    let coord = start(
        Instrumented::new(journal.clone(), &MODEL_POINTS),
        false,
        Duration::from_secs(10),
    );

    coord.submit_write("Q1:BCTRL", PointValue::Float(3.0)).unwrap();

    assert_eq!(coord.read("Q1:BACT").unwrap(), PointValue::Float(3.0));
    assert_eq!(coord.stats().cycles, 2);
    assert_eq!(journal.threads.lock().len(), 1);
}

#[test]
fn repeated_triggers_wake_the_worker_once() {
    let journal = Arc::new(Journal::default());
    let mut model = Instrumented::new(journal.clone(), &MODEL_POINTS);
    model.get_delay = Duration::from_millis(100);
    let coord = start(model, true, Duration::from_secs(10));

    coord.submit_write(STATUS, PointValue::Int(1)).unwrap();
    // Second get in flight: the triggered cycle is running.
    assert!(wait_until(|| journal.calls.lock().len() >= 2));
    assert_eq!(coord.read(STATUS).unwrap(), PointValue::Int(1));
    for _ in 0..3 {
        coord.submit_write(STATUS, PointValue::Int(1)).unwrap();
    }

    assert!(wait_until(|| coord.stats().cycles >= 3));
    thread::sleep(Duration::from_millis(300));
    assert_eq!(coord.stats().cycles, 3);
    assert_eq!(coord.read(STATUS).unwrap(), PointValue::Int(0));
}

#[test]
fn timeout_point_changes_interval_only() {
    let journal = Arc::new(Journal::default());
    let coord = start(
        Instrumented::new(journal.clone(), &MODEL_POINTS),
        true,
        Duration::ZERO,
    );

    coord.submit_write(TIMEOUT, PointValue::Float(0.5)).unwrap();

    assert_eq!(coord.interval(), Duration::from_millis(500));
    assert_eq!(coord.read(TIMEOUT).unwrap(), PointValue::Float(0.5));
    thread::sleep(Duration::from_millis(30));
    assert!(journal.sets().is_empty());
    assert_eq!(coord.stats().cycles, 1);
}

#[test]
fn unknown_and_invalid_writes_are_rejected() {
    let journal = Arc::new(Journal::default());
    let coord = start(
        Instrumented::new(journal.clone(), &MODEL_POINTS),
        true,
        Duration::from_secs(10),
    );

    assert!(matches!(
        coord.submit_write("NOPE", PointValue::Float(1.0)),
        Err(SimError::UnknownPoint { .. })
    ));
    assert!(matches!(
        coord.submit_write("Q1", PointValue::from("five")),
        Err(SimError::Validation(_))
    ));
    assert!(matches!(
        coord.read("NOPE"),
        Err(SimError::UnknownPoint { .. })
    ));
}

#[test]
fn refreshed_values_are_published() {
    #[derive(Default)]
    struct Log(Mutex<Vec<(String, PointValue)>>);

    impl Publisher for Log {
        fn publish(&self, name: &str, value: &PointValue) {
            self.0.lock().push((name.to_string(), value.clone()));
        }
    }

    let journal = Arc::new(Journal::default());
    let log = Arc::new(Log::default());
    let coord = start_with(
        Instrumented::new(journal.clone(), &MODEL_POINTS),
        catalog(&[]),
        log.clone(),
        false,
        Duration::ZERO,
    );
    log.0.lock().clear();

    coord.submit_write("Q1:BCTRL", PointValue::Float(4.0)).unwrap();

    let log = log.0.lock();
    assert_eq!(
        log.first(),
        Some(&("Q1:BCTRL".to_string(), PointValue::Float(4.0)))
    );
    assert_eq!(log[1], (STATUS.to_string(), PointValue::Int(1)));
    assert_eq!(log.last(), Some(&(STATUS.to_string(), PointValue::Int(0))));
    assert!(log.contains(&("Q1:BACT".to_string(), PointValue::Float(4.0))));
    assert_eq!(log.iter().filter(|(n, _)| n == "Q1:BCTRL").count(), 1);
}

#[test]
fn shutdown_stops_the_worker() {
    let journal = Arc::new(Journal::default());
    let coord = start(
        Instrumented::new(journal.clone(), &MODEL_POINTS),
        false,
        Duration::ZERO,
    );
    coord.shutdown();
    assert!(matches!(
        coord.submit_write("Q1", PointValue::Float(1.0)),
        Err(SimError::WorkerStopped)
    ));
    assert!(matches!(
        coord.submit_write(STATUS, PointValue::Int(1)),
        Err(SimError::WorkerStopped)
    ));
    // Rejected writes leave the cache alone.
    assert_eq!(coord.read("Q1").unwrap(), PointValue::Float(0.0));
    assert_eq!(coord.read(STATUS).unwrap(), PointValue::Int(0));
    assert!(journal.sets().is_empty());
}

#[test]
fn write_during_a_cycle_waits_for_the_next_one() {
    let journal = Arc::new(Journal::default());
    let mut model = Instrumented::new(journal.clone(), &MODEL_POINTS);
    model.get_delay = Duration::from_millis(150);
    let coord = start(model, true, Duration::from_secs(10));

    coord.submit_write(STATUS, PointValue::Int(1)).unwrap();
    // The triggered cycle's readback is in flight.
    assert!(wait_until(|| journal.calls.lock().len() >= 2));
    coord.submit_write("P1", PointValue::Float(5.0)).unwrap();

    assert!(wait_until(|| coord.stats().cycles >= 2));
    // That cycle read P1 back as 0.0 but must not clobber the newer write.
    assert_eq!(coord.read("P1").unwrap(), PointValue::Float(5.0));
    assert_eq!(journal.sets_of("P1"), 0);

    coord.submit_write(STATUS, PointValue::Int(1)).unwrap();
    assert!(wait_until(|| coord.stats().cycles >= 3));
    thread::sleep(Duration::from_millis(50));

    assert_eq!(
        journal.sets(),
        [BTreeMap::from([("P1".to_string(), PointValue::Float(5.0))])]
    );
    assert_eq!(coord.read("P1").unwrap(), PointValue::Float(5.0));
    assert_eq!(coord.stats().writes_applied, 1);
}

#[test]
fn initial_values_seed_points_the_model_does_not_report() {
    let journal = Arc::new(Journal::default());
    let mut model = Instrumented::new(journal.clone(), &MODEL_POINTS);
    model.values.insert("Q1:BACT".into(), PointValue::Float(1.5));
    let initial = BTreeMap::from([
        ("Q1:BCTRL".to_string(), PointValue::Float(7.5)),
        ("Q1:BACT".to_string(), PointValue::Float(9.0)),
        (TIMEOUT.to_string(), PointValue::Int(2)),
        ("NOT:KNOWN".to_string(), PointValue::Float(1.0)),
    ]);
    let coord = Coordinator::start_seeded(
        Box::new(model),
        catalog(&[]),
        initial,
        Arc::new(NullPublisher),
        CoordinatorOptions {
            interval: Duration::from_secs(10),
            ..CoordinatorOptions::default()
        },
    )
    .unwrap();

    // Setpoints keep their initial value, measurements take the model's.
    assert_eq!(coord.read("Q1:BCTRL").unwrap(), PointValue::Float(7.5));
    assert_eq!(coord.read("Q1:BACT").unwrap(), PointValue::Float(1.5));
    assert_eq!(coord.read(TIMEOUT).unwrap(), PointValue::Float(2.0));
    assert!(coord.read("NOT:KNOWN").is_err());
    assert!(journal.sets().is_empty());
}
