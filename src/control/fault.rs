//! fault.rs
//! Latching trip evaluator.
//!
//! Each fault kind latches on the first reading above its threshold and takes
//! the master trip with it. Nothing clears automatically; `clear()` is only
//! called while a session initialises.

use std::fmt;

use log::{error, info};

use crate::config::FaultConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    Overcurrent,
    Overtemp,
    Overvolt,
    /// Too many consecutive failed ADC reads.
    AdcFailure,
}

impl FaultKind {
    pub const COUNT: usize = 4;
    pub const ALL: [FaultKind; Self::COUNT] = [
        FaultKind::Overcurrent,
        FaultKind::Overtemp,
        FaultKind::Overvolt,
        FaultKind::AdcFailure,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            FaultKind::Overcurrent => "overcurrent",
            FaultKind::Overtemp => "overtemp",
            FaultKind::Overvolt => "overvolt",
            FaultKind::AdcFailure => "adc_failure",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed limits; a reading strictly greater than its limit trips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultThresholds {
    pub brake_current_amps: f64,
    pub temperature_c: f64,
    pub input_volts: f64,
    pub consecutive_adc_errors: u32,
}

impl From<&FaultConfig> for FaultThresholds {
    fn from(config: &FaultConfig) -> Self {
        Self {
            brake_current_amps: config.brake_current_max_amps,
            temperature_c: config.temperature_max_c,
            input_volts: config.input_volts_max,
            consecutive_adc_errors: config.max_consecutive_adc_errors,
        }
    }
}

/// Quantities guarded each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FaultInputs {
    pub brake_current_amps: f64,
    pub max_temperature_c: f64,
    pub max_input_volts: f64,
}

impl FaultInputs {
    /// `None` for kinds that are not measured from readings.
    fn value(&self, kind: FaultKind) -> Option<f64> {
        match kind {
            FaultKind::Overcurrent => Some(self.brake_current_amps),
            FaultKind::Overtemp => Some(self.max_temperature_c),
            FaultKind::Overvolt => Some(self.max_input_volts),
            FaultKind::AdcFailure => None,
        }
    }
}

impl FaultThresholds {
    fn limit(&self, kind: FaultKind) -> f64 {
        match kind {
            FaultKind::Overcurrent => self.brake_current_amps,
            FaultKind::Overtemp => self.temperature_c,
            FaultKind::Overvolt => self.input_volts,
            FaultKind::AdcFailure => f64::from(self.consecutive_adc_errors),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Latched {
    /// First reading that exceeded the limit.
    value: f64,
    /// Iteration index at which it latched.
    index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaultState {
    thresholds: FaultThresholds,
    flags: [Option<Latched>; FaultKind::COUNT],
    trip: bool,
}

/// Copy of a latched fault for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultRecord {
    pub kind: FaultKind,
    pub value: f64,
    pub limit: f64,
    pub index: usize,
}

impl FaultState {
    pub fn new(thresholds: FaultThresholds) -> Self {
        Self {
            thresholds,
            flags: [None; FaultKind::COUNT],
            trip: false,
        }
    }

    /// Evaluate this tick's readings; returns true if the trip is (now or already) set.
    pub fn evaluate(&mut self, inputs: &FaultInputs, index: usize) -> bool {
        for kind in FaultKind::ALL {
            let Some(value) = inputs.value(kind) else {
                continue;
            };
            if value > self.thresholds.limit(kind) {
                self.latch(kind, value, index);
            }
        }
        self.trip
    }

    /// Count of consecutive failed ADC reads; trips once it exceeds the limit.
    pub fn evaluate_adc_errors(&mut self, consecutive: u32, index: usize) -> bool {
        let kind = FaultKind::AdcFailure;
        let value = f64::from(consecutive);
        if value > self.thresholds.limit(kind) {
            self.latch(kind, value, index);
        }
        self.trip
    }

    fn latch(&mut self, kind: FaultKind, value: f64, index: usize) {
        let slot = &mut self.flags[kind.index()];
        if slot.is_none() {
            *slot = Some(Latched { value, index });
        }
        self.trip = true;
    }

    pub fn clear(&mut self) {
        self.flags = [None; FaultKind::COUNT];
        self.trip = false;
    }

    #[inline]
    pub fn trip(&self) -> bool {
        self.trip
    }

    #[inline]
    pub fn is_set(&self, kind: FaultKind) -> bool {
        self.flags[kind.index()].is_some()
    }

    pub fn active(&self) -> Vec<FaultRecord> {
        FaultKind::ALL
            .into_iter()
            .filter_map(|kind| {
                self.flags[kind.index()].map(|l| FaultRecord {
                    kind,
                    value: l.value,
                    limit: self.thresholds.limit(kind),
                    index: l.index,
                })
            })
            .collect()
    }

    /// Log every latched fault, or that there are none.
    pub fn report(&self) {
        if !self.trip {
            info!("[Faults] no faults");
            return;
        }
        for rec in self.active() {
            error!(
                "[Faults] {} fault: {:.3} > {:.3} at index {}",
                rec.kind, rec.value, rec.limit, rec.index
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> FaultState {
        FaultState::new(FaultThresholds {
            brake_current_amps: 3.6,
            temperature_c: 120.0,
            input_volts: 4.95,
            consecutive_adc_errors: 3,
        })
    }

    fn nominal() -> FaultInputs {
        FaultInputs {
            brake_current_amps: 1.0,
            max_temperature_c: 60.0,
            max_input_volts: 2.0,
        }
    }

    #[test]
    fn nominal_readings_do_not_trip() {
        let mut f = state();
        for i in 0..100 {
            assert!(!f.evaluate(&nominal(), i));
        }
        assert!(f.active().is_empty());
    }

    #[test]
    fn threshold_is_exclusive() {
        let mut f = state();
        let at_limit = FaultInputs { brake_current_amps: 3.6, ..nominal() };
        assert!(!f.evaluate(&at_limit, 0));
    }

    #[test]
    fn fault_latches_until_clear() {
        let mut f = state();
        let over = FaultInputs { max_temperature_c: 130.0, ..nominal() };
        assert!(f.evaluate(&over, 3));
        for i in 4..20 {
            assert!(f.evaluate(&nominal(), i));
            assert!(f.is_set(FaultKind::Overtemp));
        }
        let active = f.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, FaultKind::Overtemp);
        assert_eq!(active[0].index, 3);
        assert_eq!(active[0].value, 130.0);

        f.clear();
        assert!(!f.trip());
        assert!(!f.is_set(FaultKind::Overtemp));
    }

    #[test]
    fn trip_implies_some_flag() {
        let mut f = state();
        let cases = [
            FaultInputs { brake_current_amps: 4.0, ..nominal() },
            FaultInputs { max_temperature_c: 500.0, ..nominal() },
            FaultInputs { max_input_volts: 5.0, ..nominal() },
        ];
        for (i, case) in cases.iter().enumerate() {
            f.clear();
            assert!(f.evaluate(case, i));
            assert!(FaultKind::ALL.iter().any(|k| f.is_set(*k)));
            assert_eq!(f.active().len(), 1);
        }
    }

    #[test]
    fn adc_error_streak_trips_past_limit() {
        let mut f = state();
        for streak in 1..=3 {
            assert!(!f.evaluate_adc_errors(streak, 0));
        }
        assert!(f.evaluate_adc_errors(4, 0));
        let rec = f.active()[0];
        assert_eq!(rec.kind, FaultKind::AdcFailure);
        assert_eq!(rec.value, 4.0);
        assert_eq!(rec.limit, 3.0);
        // latched: a good read afterwards does not clear it
        assert!(f.evaluate(&nominal(), 1));
    }

    #[test]
    fn first_exceeding_value_is_kept() {
        let mut f = state();
        f.evaluate(&FaultInputs { brake_current_amps: 3.7, ..nominal() }, 1);
        f.evaluate(&FaultInputs { brake_current_amps: 9.0, ..nominal() }, 2);
        let rec = f.active()[0];
        assert_eq!(rec.value, 3.7);
        assert_eq!(rec.index, 1);
    }
}
