//! pid.rs
//! Discrete PID controller, one persistent instance per controlled actuator.
//!
//! The integral and the output are clamped from above only. The brake driver
//! is unidirectional, so no lower bound has ever been needed; if a
//! bidirectional actuator is added, symmetric clamps have to be introduced
//! here deliberately.

use crate::config::PidConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PidController {
    gains: PidGains,
    windup_guard: f64,
    output_max: f64,

    error: f64,
    previous_error: f64,
    p: f64,
    i: f64,
    d: f64,
    output: f64,
}

impl PidController {
    pub fn new(gains: PidGains, windup_guard: f64, output_max: f64) -> Self {
        Self {
            gains,
            windup_guard,
            output_max,
            error: 0.0,
            previous_error: 0.0,
            p: 0.0,
            i: 0.0,
            d: 0.0,
            output: 0.0,
        }
    }

    pub fn from_config(config: &PidConfig) -> Self {
        Self::new(
            PidGains {
                kp: config.kp,
                ki: config.ki,
                kd: config.kd,
            },
            config.windup_guard,
            config.output_max,
        )
    }

    /// Advance one control step and return the new output.
    pub fn update(&mut self, setpoint: f64, measured: f64) -> f64 {
        self.previous_error = self.error;
        self.error = setpoint - measured;

        self.p = self.error;
        self.i += self.error;
        self.d = self.error - self.previous_error;

        if self.i > self.windup_guard {
            self.i = self.windup_guard;
        }

        self.output = self.gains.kp * self.p + self.gains.ki * self.i + self.gains.kd * self.d;
        if self.output > self.output_max {
            self.output = self.output_max;
        }

        self.output
    }

    /// Zero every term; gains and bounds are kept.
    pub fn reset(&mut self) {
        self.error = 0.0;
        self.previous_error = 0.0;
        self.p = 0.0;
        self.i = 0.0;
        self.d = 0.0;
        self.output = 0.0;
    }

    #[inline]
    pub fn output(&self) -> f64 {
        self.output
    }

    #[inline]
    pub fn integral(&self) -> f64 {
        self.i
    }

    #[inline]
    pub fn error(&self) -> f64 {
        self.error
    }

    #[inline]
    pub fn terms(&self) -> (f64, f64, f64) {
        (self.p, self.i, self.d)
    }

    #[inline]
    pub fn gains(&self) -> PidGains {
        self.gains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(kp: f64, ki: f64, kd: f64, windup: f64, out_max: f64) -> PidController {
        PidController::new(PidGains { kp, ki, kd }, windup, out_max)
    }

    #[test]
    fn proportional_only_settles_on_error() {
        let mut c = pid(1.0, 0.0, 0.0, 1_000.0, 100.0);
        for _ in 0..20 {
            assert_eq!(c.update(50.0, 0.0), 50.0);
        }
    }

    #[test]
    fn proportional_output_is_capped() {
        let mut c = pid(1.0, 0.0, 0.0, 1_000.0, 30.0);
        for _ in 0..5 {
            assert_eq!(c.update(50.0, 0.0), 30.0);
        }
    }

    #[test]
    fn integral_never_exceeds_windup_guard() {
        let mut c = pid(0.0, 1.0, 0.0, 10.0, 1_000.0);
        for _ in 0..50 {
            c.update(100.0, 0.0);
            assert!(c.integral() <= 10.0);
        }
        assert_eq!(c.integral(), 10.0);
        assert_eq!(c.output(), 10.0);
    }

    #[test]
    fn clamps_are_upper_only() {
        let mut c = pid(1.0, 1.0, 0.0, 10.0, 100.0);
        for _ in 0..5 {
            c.update(0.0, 20.0);
        }
        // negative integral and output pass through unclamped
        assert_eq!(c.integral(), -100.0);
        assert_eq!(c.output(), -120.0);
    }

    #[test]
    fn derivative_uses_previous_error() {
        let mut c = pid(0.0, 0.0, 1.0, 100.0, 100.0);
        assert_eq!(c.update(10.0, 0.0), 10.0);
        assert_eq!(c.update(10.0, 4.0), -4.0);
        assert_eq!(c.terms().2, -4.0);
    }

    #[test]
    fn reset_zeroes_terms_but_keeps_gains() {
        let mut c = pid(2.0, 0.5, 0.1, 10.0, 100.0);
        c.update(40.0, 10.0);
        c.update(40.0, 20.0);
        c.reset();
        assert_eq!(c.terms(), (0.0, 0.0, 0.0));
        assert_eq!(c.output(), 0.0);
        assert_eq!(c.error(), 0.0);
        assert_eq!(c.gains(), PidGains { kp: 2.0, ki: 0.5, kd: 0.1 });
        // behaves like a fresh controller afterwards
        let mut fresh = pid(2.0, 0.5, 0.1, 10.0, 100.0);
        assert_eq!(c.update(40.0, 10.0), fresh.update(40.0, 10.0));
    }
}
