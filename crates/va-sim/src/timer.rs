//! Restartable countdown used to debounce evaluation requests.
//!
//! The timer is an explicit state machine driven by one scheduling thread:
//!
//! ```text
//!   Idle --reset--> Armed --expiry--> Firing --+--> Armed     (periodic, automatic)
//!    ^                |                        +--> Idle      (periodic, manual)
//!    +----cancel------+ (manual)               +--> Expired   (one-shot)
//! ```
//!
//! `cancel` on an automatic periodic timer re-arms immediately; on a one-shot
//! timer it moves to `Cancelled`. `Cancelled` and `Expired` are terminal.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::trace;

use crate::error::{SimError, SimResult};

type Callback = Box<dyn FnMut() + Send>;

/// Observable timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// No countdown running.
    Idle,
    /// Counting down toward the interval.
    Armed,
    /// Callback executing.
    Firing,
    /// One-shot countdown aborted before firing.
    Cancelled,
    /// One-shot timer that already fired.
    Expired,
}

#[derive(Debug, Clone, Copy)]
pub struct TimerOptions {
    pub interval: Duration,
    /// Re-arm after firing instead of terminating.
    pub periodic: bool,
    /// Stay idle until `reset`, both at start and after each firing or cancel.
    pub manual: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Armed { deadline: Instant },
    Firing,
    Cancelled,
    Expired,
}

impl Phase {
    fn is_terminal(self) -> bool {
        matches!(self, Phase::Cancelled | Phase::Expired)
    }
}

struct Inner {
    phase: Phase,
    interval: Duration,
    /// A reset arrived while the callback was running.
    rearm_after_fire: bool,
    fires: u64,
    shutdown: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    cond: Condvar,
}

pub struct DebounceTimer {
    shared: Arc<Shared>,
    periodic: bool,
    manual: bool,
    callback: Mutex<Option<Callback>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceTimer {
    pub fn new(options: TimerOptions, callback: impl FnMut() + Send + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    phase: Phase::Idle,
                    interval: options.interval,
                    rearm_after_fire: false,
                    fires: 0,
                    shutdown: false,
                }),
                cond: Condvar::new(),
            }),
            periodic: options.periodic,
            manual: options.manual,
            callback: Mutex::new(Some(Box::new(callback))),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the scheduling thread. Automatic timers arm immediately.
    pub fn start(&self) -> SimResult<()> {
        let callback = self.callback.lock().take().ok_or(SimError::InvalidArg {
            what: "timer already started",
        })?;

        if !self.manual {
            let mut inner = self.shared.inner.lock();
            if inner.phase == Phase::Idle {
                inner.phase = Phase::Armed {
                    deadline: Instant::now() + inner.interval,
                };
            }
        }

        let shared = self.shared.clone();
        let (periodic, manual) = (self.periodic, self.manual);
        let handle = thread::Builder::new()
            .name("va-debounce".to_string())
            .spawn(move || run(shared, callback, periodic, manual))
            .map_err(|e| SimError::Thread {
                message: e.to_string(),
            })?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Abort any countdown and arm a fresh one of the current interval.
    ///
    /// During firing the re-arm is deferred until the callback returns.
    /// No effect on a terminated one-shot timer.
    pub fn reset(&self) {
        let mut inner = self.shared.inner.lock();
        match inner.phase {
            Phase::Cancelled | Phase::Expired => return,
            Phase::Firing => inner.rearm_after_fire = true,
            Phase::Idle | Phase::Armed { .. } => {
                inner.phase = Phase::Armed {
                    deadline: Instant::now() + inner.interval,
                };
            }
        }
        trace!(interval_s = inner.interval.as_secs_f64(), "timer reset");
        self.shared.cond.notify_all();
    }

    /// Abort the current countdown without running the callback.
    pub fn cancel(&self) {
        let mut inner = self.shared.inner.lock();
        match inner.phase {
            Phase::Cancelled | Phase::Expired => return,
            Phase::Firing => inner.rearm_after_fire = false,
            Phase::Idle | Phase::Armed { .. } => {
                inner.phase = if !self.periodic {
                    Phase::Cancelled
                } else if self.manual {
                    Phase::Idle
                } else {
                    Phase::Armed {
                        deadline: Instant::now() + inner.interval,
                    }
                };
            }
        }
        trace!(state = ?inner.phase, "timer cancelled");
        self.shared.cond.notify_all();
    }

    /// Change the countdown length; an armed countdown keeps its deadline.
    pub fn set_interval(&self, interval: Duration) {
        self.shared.inner.lock().interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.shared.inner.lock().interval
    }

    pub fn state(&self) -> TimerState {
        match self.shared.inner.lock().phase {
            Phase::Idle => TimerState::Idle,
            Phase::Armed { .. } => TimerState::Armed,
            Phase::Firing => TimerState::Firing,
            Phase::Cancelled => TimerState::Cancelled,
            Phase::Expired => TimerState::Expired,
        }
    }

    /// Number of completed callback invocations.
    pub fn fire_count(&self) -> u64 {
        self.shared.inner.lock().fires
    }

    /// Stop the scheduling thread and wait for it.
    pub fn shutdown(&self) {
        self.shared.inner.lock().shutdown = true;
        self.shared.cond.notify_all();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: Arc<Shared>, mut callback: Callback, periodic: bool, manual: bool) {
    let mut inner = shared.inner.lock();
    while !inner.shutdown {
        let Phase::Armed { deadline } = inner.phase else {
            shared.cond.wait(&mut inner);
            continue;
        };
        if Instant::now() < deadline {
            shared.cond.wait_until(&mut inner, deadline);
            continue;
        }

        inner.phase = Phase::Firing;
        inner.rearm_after_fire = false;
        trace!("timer firing");
        MutexGuard::unlocked(&mut inner, || callback());
        inner.fires += 1;

        inner.phase = if inner.phase.is_terminal() {
            inner.phase
        } else if !periodic {
            Phase::Expired
        } else if inner.rearm_after_fire || !manual {
            Phase::Armed {
                deadline: Instant::now() + inner.interval,
            }
        } else {
            Phase::Idle
        };
        shared.cond.notify_all();
    }
}
