//! setpoint.rs
//! Pre-loaded setpoint playback: brake-current and throttle targets (%)
//! indexed by loop iteration. The sequence length is the session length.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{DaqError, Result};

/// Targets for one iteration, both in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoint {
    pub brake: f64,
    pub throttle: f64,
}

/// What the control loop does when the index reaches the end of the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TerminationPolicy {
    /// End the session (Completed).
    Stop,
    /// Wrap to index 0 and keep running until a fault or halt.
    Loop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetpointSequence {
    brake: Vec<f64>,
    throttle: Vec<f64>,
}

impl SetpointSequence {
    pub fn new(brake: Vec<f64>, throttle: Vec<f64>) -> Result<Self> {
        if brake.len() != throttle.len() {
            return Err(DaqError::Profile(format!(
                "brake and throttle sequences differ in length ({} vs {})",
                brake.len(),
                throttle.len()
            )));
        }
        if brake.is_empty() {
            return Err(DaqError::Profile("setpoint sequences are empty".into()));
        }
        // the record fields are 6.2 wide, so targets must stay within 0-100 %
        if let Some(v) = brake
            .iter()
            .chain(throttle.iter())
            .find(|v| !(0.0..=100.0).contains(*v))
        {
            return Err(DaqError::Profile(format!("setpoint {v} outside 0-100 %")));
        }
        Ok(Self { brake, throttle })
    }

    /// Same targets for every iteration.
    pub fn constant(len: usize, brake: f64, throttle: f64) -> Result<Self> {
        Self::new(vec![brake; len], vec![throttle; len])
    }

    /// Linear ramp of both targets from zero up to the given levels.
    pub fn ramp(len: usize, brake_peak: f64, throttle_peak: f64) -> Result<Self> {
        let step = |peak: f64, i: usize| {
            if len <= 1 {
                peak
            } else {
                peak * i as f64 / (len - 1) as f64
            }
        };
        Self::new(
            (0..len).map(|i| step(brake_peak, i)).collect(),
            (0..len).map(|i| step(throttle_peak, i)).collect(),
        )
    }

    /// Pure lookup. The caller guarantees `index < len()`.
    #[inline]
    pub fn fetch(&self, index: usize) -> Setpoint {
        Setpoint {
            brake: self.brake[index],
            throttle: self.throttle[index],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.brake.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.brake.is_empty()
    }
}

/// A loaded profile and the end-of-sequence behaviour chosen for this session.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub sequence: SetpointSequence,
    pub policy: TerminationPolicy,
}

impl Profile {
    pub fn new(id: impl Into<String>, sequence: SetpointSequence, policy: TerminationPolicy) -> Self {
        Self {
            id: id.into(),
            sequence,
            policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unequal_lengths() {
        let err = SetpointSequence::new(vec![1.0, 2.0], vec![1.0]).unwrap_err();
        assert!(matches!(err, DaqError::Profile(_)));
    }

    #[test]
    fn rejects_empty() {
        assert!(SetpointSequence::new(vec![], vec![]).is_err());
    }

    #[test]
    fn rejects_targets_outside_percent_range() {
        for bad in [1_000.0, -0.5, f64::NAN, f64::INFINITY] {
            let err = SetpointSequence::new(vec![10.0, bad], vec![0.0, 50.0]).unwrap_err();
            assert!(matches!(err, DaqError::Profile(_)));
        }
        assert!(SetpointSequence::constant(3, 40.0, 150.0).is_err());
        assert!(SetpointSequence::new(vec![0.0, 100.0], vec![100.0, 0.0]).is_ok());
    }

    #[test]
    fn fetch_is_indexed_lookup() {
        let seq = SetpointSequence::new(vec![10.0, 20.0, 30.0], vec![0.0, 50.0, 100.0]).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.fetch(1), Setpoint { brake: 20.0, throttle: 50.0 });
        assert_eq!(seq.fetch(2), Setpoint { brake: 30.0, throttle: 100.0 });
    }

    #[test]
    #[should_panic]
    fn fetch_past_end_is_a_contract_violation() {
        let seq = SetpointSequence::constant(2, 10.0, 20.0).unwrap();
        seq.fetch(2);
    }

    #[test]
    fn ramp_spans_zero_to_peak() {
        let seq = SetpointSequence::ramp(5, 40.0, 80.0).unwrap();
        assert_eq!(seq.fetch(0), Setpoint { brake: 0.0, throttle: 0.0 });
        assert_eq!(seq.fetch(2), Setpoint { brake: 20.0, throttle: 40.0 });
        assert_eq!(seq.fetch(4), Setpoint { brake: 40.0, throttle: 80.0 });
    }
}
