//! Counters and tick-timing history for one control session.
//!
//! Two independent paths:
//! - **DaqCounters:** plain atomics, written from the timer thread, the edge
//!   threads, the control loop and drain threads without any locking.
//! - **TickTiming:** bounded history of timer wake jitter, owned by the timer
//!   thread and handed back when it is joined.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use average::{Max, Mean, Min};
use serde::Serialize;

#[derive(Debug, Default)]
pub struct DaqCounters {
    pub ticks_fired: AtomicU64,
    /// Ticks that replaced a token the control loop had not consumed yet.
    pub ticks_overwritten: AtomicU64,
    pub ticks_late: AtomicU64,
    pub samples_logged: AtomicU64,
    pub samples_dropped: AtomicU64,
    pub swaps: AtomicU64,
    pub drains_completed: AtomicU64,
    pub drains_skipped: AtomicU64,
    pub records_written: AtomicU64,
    pub storage_errors: AtomicU64,
    pub edges_rejected: AtomicU64,
    /// Ticks skipped because the ADC read failed.
    pub adc_errors: AtomicU64,
}

pub type SharedCounters = Arc<DaqCounters>;

impl DaqCounters {
    pub fn shared() -> SharedCounters {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            ticks_fired: load(&self.ticks_fired),
            ticks_overwritten: load(&self.ticks_overwritten),
            ticks_late: load(&self.ticks_late),
            samples_logged: load(&self.samples_logged),
            samples_dropped: load(&self.samples_dropped),
            swaps: load(&self.swaps),
            drains_completed: load(&self.drains_completed),
            drains_skipped: load(&self.drains_skipped),
            records_written: load(&self.records_written),
            storage_errors: load(&self.storage_errors),
            edges_rejected: load(&self.edges_rejected),
            adc_errors: load(&self.adc_errors),
        }
    }
}

/// Point-in-time copy of `DaqCounters`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub ticks_fired: u64,
    pub ticks_overwritten: u64,
    pub ticks_late: u64,
    pub samples_logged: u64,
    pub samples_dropped: u64,
    pub swaps: u64,
    pub drains_completed: u64,
    pub drains_skipped: u64,
    pub records_written: u64,
    pub storage_errors: u64,
    pub edges_rejected: u64,
    pub adc_errors: u64,
}

pub const MAX_POINTS: usize = 1_000;

/// Appends u64 value to a history buffer; removes oldest if at capacity.
#[inline]
pub fn push_capped_u64(buf: &mut VecDeque<u64>, val: u64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

/// Timer wake jitter (µs) for the most recent `MAX_POINTS` ticks.
#[derive(Debug, Default)]
pub struct TickTiming {
    pub jitter_us: VecDeque<u64>,
}

/// Statistics summary for a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Computes min, max, mean for a u64 buffer.
pub fn calculate_stats_u64(data: &VecDeque<u64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let min: Min = data.iter().map(|&x| x as f64).collect();
    let max: Max = data.iter().map(|&x| x as f64).collect();
    let mean: Mean = data.iter().map(|&x| x as f64).collect();

    Some(Stats {
        min: min.min(),
        max: max.max(),
        mean: mean.mean(),
        count: data.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_capped() {
        let mut buf = VecDeque::new();
        for i in 0..(MAX_POINTS as u64 + 10) {
            push_capped_u64(&mut buf, i);
        }
        assert_eq!(buf.len(), MAX_POINTS);
        assert_eq!(buf.front(), Some(&10));
    }

    #[test]
    fn stats_over_jitter() {
        let buf: VecDeque<u64> = [10, 20, 30].into_iter().collect();
        let stats = calculate_stats_u64(&buf).unwrap();
        assert_eq!(stats.count, 3);
        assert!((stats.min - 10.0).abs() < 1e-9);
        assert!((stats.max - 30.0).abs() < 1e-9);
        assert!((stats.mean - 20.0).abs() < 1e-9);
        assert!(calculate_stats_u64(&VecDeque::new()).is_none());
    }

    #[test]
    fn snapshot_reflects_increments() {
        let counters = DaqCounters::shared();
        DaqCounters::incr(&counters.swaps);
        DaqCounters::add(&counters.records_written, 5);
        let snap = counters.snapshot();
        assert_eq!(snap.swaps, 1);
        assert_eq!(snap.records_written, 5);
        assert_eq!(snap.drains_skipped, 0);
    }
}
