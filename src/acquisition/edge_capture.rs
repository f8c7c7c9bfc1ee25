//! edge_capture.rs
//! Rising-edge speed capture, one instance per monitored shaft.
//!
//! rate = 60 / (seconds between consecutive edges). Rates above the shaft
//! ceiling are discarded at the source (double edges, glitches); the last
//! accepted rate stays visible to the control loop.

use std::sync::Arc;

use log::trace;

use crate::{
    acquisition::slot::{RateReader, RateSlot},
    utils::metrics::{DaqCounters, SharedCounters},
};

/// Producer half, owned by whatever delivers the edge events.
pub struct EdgeCapture {
    name: &'static str,
    max_rpm: f64,
    last_edge_secs: Option<f64>,
    slot: Arc<RateSlot>,
    counters: SharedCounters,
}

/// Outcome of a single edge, mostly for tests and tracing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeOutcome {
    /// First edge: establishes the time base only.
    Primed,
    Published(f64),
    Rejected(f64),
}

/// Create a capture for one shaft and the reader the control loop peeks.
pub fn edge_capture(
    name: &'static str,
    max_rpm: f64,
    counters: SharedCounters,
) -> (EdgeCapture, RateReader) {
    let slot = RateSlot::new();
    let reader = RateReader::new(slot.clone());
    (
        EdgeCapture {
            name,
            max_rpm,
            last_edge_secs: None,
            slot,
            counters,
        },
        reader,
    )
}

impl EdgeCapture {
    /// Handle one rising edge at `now_secs` on the capture time base.
    pub fn on_edge(&mut self, now_secs: f64) -> EdgeOutcome {
        let previous = self.last_edge_secs.replace(now_secs);
        let Some(previous) = previous else {
            return EdgeOutcome::Primed;
        };

        let rate = 60.0 / (now_secs - previous);
        if rate.is_finite() && rate >= 0.0 && rate <= self.max_rpm {
            self.slot.publish(rate);
            EdgeOutcome::Published(rate)
        } else {
            DaqCounters::incr(&self.counters.edges_rejected);
            trace!("[EdgeCapture:{}] rejected {:.1} rpm", self.name, rate);
            EdgeOutcome::Rejected(rate)
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_rate_from_edge_period() {
        let (mut cap, reader) = edge_capture("primary", 4_500.0, DaqCounters::shared());
        assert_eq!(cap.on_edge(1.0), EdgeOutcome::Primed);
        assert_eq!(reader.latest(), 0.0);

        // 20 ms between edges -> 3000 rpm
        match cap.on_edge(1.020) {
            EdgeOutcome::Published(rpm) => assert!((rpm - 3_000.0).abs() < 1e-6),
            other => panic!("unexpected {other:?}"),
        }
        assert!((reader.latest() - 3_000.0).abs() < 1e-6);
    }

    #[test]
    fn rate_above_ceiling_is_never_published() {
        let counters = DaqCounters::shared();
        let (mut cap, reader) = edge_capture("secondary", 4_500.0, counters.clone());
        cap.on_edge(0.0);
        cap.on_edge(0.030); // 2000 rpm
        let before = reader.latest();

        // 1 ms double edge -> 60000 rpm
        assert!(matches!(cap.on_edge(0.031), EdgeOutcome::Rejected(_)));
        assert_eq!(reader.latest(), before);

        // zero elapsed time is rejected too
        assert!(matches!(cap.on_edge(0.031), EdgeOutcome::Rejected(_)));
        assert_eq!(reader.latest(), before);
        assert_eq!(counters.snapshot().edges_rejected, 2);
    }

    #[test]
    fn rejected_edge_still_advances_time_base() {
        let (mut cap, reader) = edge_capture("primary", 4_500.0, DaqCounters::shared());
        cap.on_edge(0.0);
        cap.on_edge(0.001); // rejected
        // measured from the rejected edge: 30 ms -> 2000 rpm
        cap.on_edge(0.031);
        assert!((reader.latest() - 2_000.0).abs() < 1e-6);
    }
}
