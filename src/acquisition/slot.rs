//! Overwrite cells shared between producers and readers.
//!
//! A producer only ever stores the latest value; the reader only ever peeks.
//! Rate cells are one lock-free atomic word. The sample cell is wider than a
//! word, so `AtomicCell` guards it with its internal seqlock; writers still
//! never wait on a reader.

use std::sync::Arc;

use crossbeam::atomic::AtomicCell;

use crate::logging::record::Sample;

/// Latest accepted shaft speed (rpm). Starts at zero until the first valid edge pair.
#[derive(Debug)]
pub struct RateSlot {
    value: AtomicCell<f64>,
}

impl RateSlot {
    pub fn new() -> Arc<Self> {
        debug_assert!(AtomicCell::<f64>::is_lock_free());
        Arc::new(Self {
            value: AtomicCell::new(0.0),
        })
    }

    /// Replace whatever was published before.
    #[inline]
    pub fn publish(&self, rate: f64) {
        self.value.store(rate);
    }

    /// Read without consuming; repeated peeks see the same value until the next publish.
    #[inline]
    pub fn peek(&self) -> f64 {
        self.value.load()
    }
}

/// Read side handed to the control loop.
#[derive(Debug, Clone)]
pub struct RateReader {
    slot: Arc<RateSlot>,
}

impl RateReader {
    pub fn new(slot: Arc<RateSlot>) -> Self {
        Self { slot }
    }

    #[inline]
    pub fn latest(&self) -> f64 {
        self.slot.peek()
    }
}

/// Latest sample of the running session, for a live display.
#[derive(Debug, Default)]
pub struct SampleSlot {
    value: AtomicCell<Sample>,
}

impl SampleSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn publish(&self, sample: Sample) {
        self.value.store(sample);
    }
}

#[derive(Debug, Clone)]
pub struct SampleReader {
    slot: Arc<SampleSlot>,
}

impl SampleReader {
    pub fn new(slot: Arc<SampleSlot>) -> Self {
        Self { slot }
    }

    /// Most recent sample, or all zeros before the first tick.
    #[inline]
    pub fn latest(&self) -> Sample {
        self.slot.value.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_does_not_consume() {
        let slot = RateSlot::new();
        let reader = RateReader::new(slot.clone());
        assert_eq!(reader.latest(), 0.0);
        slot.publish(1_200.0);
        assert_eq!(reader.latest(), 1_200.0);
        assert_eq!(reader.latest(), 1_200.0);
        slot.publish(1_250.0);
        assert_eq!(reader.latest(), 1_250.0);
    }

    #[test]
    fn sample_slot_keeps_only_the_latest() {
        let slot = SampleSlot::new();
        let reader = SampleReader::new(slot.clone());
        assert_eq!(reader.latest(), Sample::default());
        for rpm in [100, 200, 300] {
            slot.publish(Sample {
                primary_rpm: rpm,
                ..Sample::default()
            });
        }
        assert_eq!(reader.latest().primary_rpm, 300);
        assert_eq!(reader.latest().primary_rpm, 300);
    }
}
