//! shaft.rs
//! Rising-edge generator for one shaft, standing in for the capture input.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng};
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::acquisition::edge_capture::{EdgeCapture, EdgeOutcome};

/// One edge per revolution at `rpm`, with period jitter and occasional
/// contact-bounce double edges.
#[derive(Debug, Clone, Copy)]
pub struct ShaftSim {
    pub rpm: f64,
    /// Relative period jitter, e.g. 0.02 for ±2 %.
    pub jitter_frac: f64,
    /// Probability that an edge is followed by a bounce edge.
    pub bounce_prob: f64,
    pub seed: u64,
}

impl ShaftSim {
    pub fn steady(rpm: f64) -> Self {
        Self {
            rpm,
            jitter_frac: 0.0,
            bounce_prob: 0.0,
            seed: 0,
        }
    }
}

/// Feed edges into `capture` until `running` clears. Returns the number of
/// published rates.
pub fn spawn_shaft(
    mut capture: EdgeCapture,
    sim: ShaftSim,
    running: Arc<AtomicBool>,
) -> io::Result<JoinHandle<u64>> {
    thread::Builder::new()
        .name(format!("shaft_{}", capture.name()))
        .spawn(move || {
            let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
            let mut rng = StdRng::seed_from_u64(sim.seed);
            let base_period = 60.0 / sim.rpm.max(1.0);
            let start = Instant::now();
            let mut published = 0u64;

            while running.load(Ordering::Acquire) {
                let jitter = if sim.jitter_frac > 0.0 {
                    rng.random_range(-sim.jitter_frac..=sim.jitter_frac)
                } else {
                    0.0
                };
                sleeper.sleep(Duration::from_secs_f64(base_period * (1.0 + jitter)));

                let now = start.elapsed().as_secs_f64();
                if let EdgeOutcome::Published(_) = capture.on_edge(now) {
                    published += 1;
                }
                if sim.bounce_prob > 0.0 && rng.random_bool(sim.bounce_prob) {
                    // 20 µs bounce reads as an impossible speed
                    capture.on_edge(now + 20e-6);
                }
            }

            debug!("[Shaft:{}] stopped, {} rates published", capture.name(), published);
            published
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{acquisition::edge_capture::edge_capture, utils::metrics::DaqCounters};

    #[test]
    fn steady_shaft_publishes_its_speed() {
        let counters = DaqCounters::shared();
        let (capture, reader) = edge_capture("primary", 4_500.0, counters);
        let running = Arc::new(AtomicBool::new(true));
        let handle = spawn_shaft(capture, ShaftSim::steady(3_000.0), running.clone()).unwrap();

        // 3000 rpm is one edge every 20 ms
        thread::sleep(Duration::from_millis(150));
        running.store(false, Ordering::Release);
        let published = handle.join().unwrap();

        assert!(published >= 2);
        let rpm = reader.latest();
        assert!(rpm > 1_500.0 && rpm <= 3_000.5, "rpm {rpm}");
    }

    #[test]
    fn bounces_are_rejected() {
        let counters = DaqCounters::shared();
        let (capture, _reader) = edge_capture("secondary", 4_500.0, counters.clone());
        let running = Arc::new(AtomicBool::new(true));
        let sim = ShaftSim {
            bounce_prob: 1.0,
            ..ShaftSim::steady(3_000.0)
        };
        let handle = spawn_shaft(capture, sim, running.clone()).unwrap();
        thread::sleep(Duration::from_millis(60));
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        assert!(counters.snapshot().edges_rejected >= 1);
    }
}
