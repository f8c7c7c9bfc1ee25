//! tick.rs
//! Fixed-rate tick source and its single-slot handoff to the control loop.
//! - The timer side overwrites the pending token; it never queues.
//! - At most one wake is pending at any time, so a slow control iteration
//!   cannot build a backlog of ticks.
//! - The periodic driver re-arms against absolute deadlines (SpinSleeper),
//!   like a hardware alarm with auto-reload.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::sync::{Parker, Unparker};
use log::{debug, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::{
    config::TickConfig,
    utils::metrics::{DaqCounters, SharedCounters, TickTiming, push_capped_u64},
};

/// Token delivered to the control loop; `seq` counts fires since the channel was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub seq: u64,
}

#[derive(Debug, Default)]
struct TickShared {
    /// 0 = nothing pending, otherwise the seq of the latest fire.
    pending: AtomicU64,
    fired: AtomicU64,
}

/// Timer ("interrupt") side.
pub struct TickSource {
    shared: Arc<TickShared>,
    unparker: Unparker,
    counters: SharedCounters,
}

/// Control-task side.
pub struct TickReceiver {
    shared: Arc<TickShared>,
    parker: Parker,
}

pub fn tick_channel(counters: SharedCounters) -> (TickSource, TickReceiver) {
    let shared = Arc::new(TickShared::default());
    let parker = Parker::new();
    let unparker = parker.unparker().clone();
    (
        TickSource {
            shared: shared.clone(),
            unparker,
            counters,
        },
        TickReceiver { shared, parker },
    )
}

impl TickSource {
    /// Publish a new tick, replacing any token the control loop has not taken yet.
    pub fn fire(&self) -> u64 {
        let seq = self.shared.fired.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self.shared.pending.swap(seq, Ordering::AcqRel);
        DaqCounters::incr(&self.counters.ticks_fired);
        if previous != 0 {
            DaqCounters::incr(&self.counters.ticks_overwritten);
        }
        self.unparker.unpark();
        seq
    }

    /// Drive this source from a dedicated timer thread until `running` clears.
    ///
    /// The thread returns the jitter history it collected.
    pub fn spawn_periodic(
        self,
        config: &TickConfig,
        running: Arc<AtomicBool>,
    ) -> io::Result<JoinHandle<TickTiming>> {
        let period = config.period();
        let late_tolerance = Duration::from_micros(config.late_tolerance_us);

        thread::Builder::new()
            .name("tick_source".into())
            .spawn(move || self.run_periodic(period, late_tolerance, running))
    }

    fn run_periodic(
        self,
        period: Duration,
        late_tolerance: Duration,
        running: Arc<AtomicBool>,
    ) -> TickTiming {
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let period_us = period.as_micros() as u64;
        let mut timing = TickTiming::default();

        let mut next_deadline = Instant::now() + period;
        let mut last_tick = Instant::now();

        while running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now < next_deadline {
                sleeper.sleep(next_deadline - now);
            }

            let actual_tick = Instant::now();
            if actual_tick.saturating_duration_since(next_deadline) > late_tolerance {
                DaqCounters::incr(&self.counters.ticks_late);
            }

            let actual_period_us = actual_tick.duration_since(last_tick).as_micros() as u64;
            push_capped_u64(&mut timing.jitter_us, actual_period_us.abs_diff(period_us));
            last_tick = actual_tick;

            self.fire();

            // re-arm
            next_deadline += period;
            if actual_tick > next_deadline + period {
                warn!("[Tick] timer fell more than one period behind; resynchronising");
                next_deadline = actual_tick + period;
            }
        }

        debug!(
            "[Tick] stopped after {} fires",
            self.shared.fired.load(Ordering::Relaxed)
        );
        timing
    }
}

impl TickReceiver {
    /// Consume the pending tick, if any.
    #[inline]
    pub fn try_take(&self) -> Option<Tick> {
        match self.shared.pending.swap(0, Ordering::AcqRel) {
            0 => None,
            seq => Some(Tick { seq }),
        }
    }

    /// Block until a tick is published or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Tick> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(tick) = self.try_take() {
                return Some(tick);
            }
            if Instant::now() >= deadline {
                return None;
            }
            self.parker.park_deadline(deadline);
        }
    }
}
