//! record.rs
//! One logged sample per tick and its fixed-width text record.

use std::fmt::Write as _;

/// Sensor and setpoint values captured in a single tick.
///
/// Sensor channels are kept as raw ADC counts; speeds are rounded rpm.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    pub primary_rpm: u16,
    pub secondary_rpm: u16,
    pub torque: u16,
    pub temp1: u16,
    pub temp2: u16,
    pub temp3: u16,
    pub belt_temp: u16,
    pub brake_current: u16,
    pub load_cell: u16,
    pub throttle_position: u16,
    /// Brake-current target, %.
    pub brake_setpoint: f32,
    /// Throttle target, %.
    pub throttle_setpoint: f32,
}

/// Ten 6-wide integers, two 6.2 floats, ", " separators and a newline.
pub const RECORD_LEN: usize = 10 * 6 + 2 * 6 + 11 * 2 + 1;

impl Sample {
    /// Append this sample as one record line to `out`.
    pub fn write_record(&self, out: &mut String) {
        // writing into a String cannot fail
        let _ = writeln!(
            out,
            "{:6}, {:6}, {:6}, {:6}, {:6}, {:6}, {:6}, {:6}, {:6}, {:6}, {:6.2}, {:6.2}",
            self.primary_rpm,
            self.secondary_rpm,
            self.torque,
            self.temp1,
            self.temp2,
            self.temp3,
            self.belt_temp,
            self.brake_current,
            self.load_cell,
            self.throttle_position,
            self.brake_setpoint,
            self.throttle_setpoint,
        );
    }

    pub fn to_record(&self) -> String {
        let mut line = String::with_capacity(RECORD_LEN);
        self.write_record(&mut line);
        line
    }
}

/// Saturating conversion of a speed reading to the record's integer rpm.
#[inline]
pub fn rpm_field(rate: f64) -> u16 {
    if rate.is_finite() {
        rate.round().clamp(0.0, f64::from(u16::MAX)) as u16
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sample {
        Sample {
            primary_rpm: 3_000,
            secondary_rpm: 1_250,
            torque: 812,
            temp1: 1,
            temp2: 22,
            temp3: 333,
            belt_temp: 4_095,
            brake_current: 1_024,
            load_cell: 77,
            throttle_position: 2_000,
            brake_setpoint: 10.0,
            throttle_setpoint: 55.5,
        }
    }

    #[test]
    fn record_is_fixed_width_in_field_order() {
        let line = sample().to_record();
        assert_eq!(
            line,
            "  3000,   1250,    812,      1,     22,    333,   4095,   1024,     77,   2000,  10.00,  55.50\n"
        );
        assert_eq!(line.len(), RECORD_LEN);
    }

    #[test]
    fn every_record_has_the_same_width() {
        let zero = Sample::default().to_record();
        let full = Sample {
            primary_rpm: u16::MAX,
            brake_setpoint: 100.0,
            throttle_setpoint: 100.0,
            ..sample()
        }
        .to_record();
        assert_eq!(zero.len(), RECORD_LEN);
        assert_eq!(full.len(), RECORD_LEN);
        assert_eq!(zero.split(", ").count(), 12);
    }

    #[test]
    fn rpm_field_saturates() {
        assert_eq!(rpm_field(2_999.6), 3_000);
        assert_eq!(rpm_field(-5.0), 0);
        assert_eq!(rpm_field(1e9), u16::MAX);
        assert_eq!(rpm_field(f64::NAN), 0);
    }
}
