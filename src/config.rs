//! Session configuration.
//!
//! Defaults mirror the bench firmware constants: 1 kHz DAQ timer, 1000-sample
//! log buffers, 50 % launch threshold, 3.6 A brake current ceiling and
//! 4500 rpm edge ceilings. A JSON file may override any section.

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    acquisition::adc::{AdcChannel, ChannelScale, ChannelSelection, Converter},
    error::{DaqError, Result},
};

pub const MAX_TICK_HZ: u32 = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Control loop cadence.
    pub hz: u32,
    /// A timer wake later than this (µs) past its deadline counts as late.
    pub late_tolerance_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            hz: 1_000,
            late_tolerance_us: 200,
        }
    }
}

impl TickConfig {
    pub fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.hz.max(1)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Samples per buffer (each of the two).
    pub buffer_capacity: usize,
    /// Append target for `FileStorage`.
    pub output_path: String,
    /// When false the control loop runs without persisting samples.
    pub enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1_000,
            output_path: "dyno_data/dyno_data.csv".into(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Upper bound on the accumulated integral.
    pub windup_guard: f64,
    /// Upper bound on the output (brake duty %).
    pub output_max: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.05,
            kd: 0.1,
            windup_guard: 200.0,
            output_max: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    pub brake_current_max_amps: f64,
    pub temperature_max_c: f64,
    /// Any ADC input above this is treated as an over-voltage.
    pub input_volts_max: f64,
    /// Failed ADC reads in a row tolerated before the session faults.
    pub max_consecutive_adc_errors: u32,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            brake_current_max_amps: 3.6,
            temperature_max_c: 120.0,
            input_volts_max: 4.95,
            max_consecutive_adc_errors: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub primary_max_rpm: f64,
    pub secondary_max_rpm: f64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            primary_max_rpm: 4_500.0,
            secondary_max_rpm: 4_500.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcConfig {
    pub full_scale_counts: u16,
    pub reference_volts: f64,
    pub selection: ChannelSelection,
    /// Linear scale/offset per channel, indexed by `AdcChannel`.
    pub scales: [ChannelScale; AdcChannel::COUNT],
    /// Brake current that corresponds to 100 % of the brake target.
    pub brake_current_full_scale_amps: f64,
}

impl Default for AdcConfig {
    fn default() -> Self {
        let mut scales = [ChannelScale::IDENTITY; AdcChannel::COUNT];
        // 10 mV/°C thermocouple amplifiers
        for ch in AdcChannel::TEMPERATURES {
            scales[ch.index()] = ChannelScale { scale: 100.0, offset: 0.0 };
        }
        Self {
            full_scale_counts: 4_095,
            reference_volts: 5.0,
            selection: ChannelSelection::ALL,
            scales,
            brake_current_full_scale_amps: 3.6,
        }
    }
}

impl AdcConfig {
    pub fn converter(&self) -> Converter {
        Converter::new(self.full_scale_counts, self.reference_volts, self.scales)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Throttle target (%) at which the e-brake hold-back is released.
    pub launch_threshold_pct: f64,
    pub engine_confirm_timeout_ms: u64,
    /// Pin the control thread to this core when set.
    pub control_core: Option<usize>,
    pub profile_id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            launch_threshold_pct: 50.0,
            engine_confirm_timeout_ms: 5_000,
            control_core: None,
            profile_id: "default".into(),
        }
    }
}

impl SessionConfig {
    pub fn engine_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_confirm_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaqConfig {
    pub tick: TickConfig,
    pub logging: LoggingConfig,
    pub pid: PidConfig,
    pub faults: FaultConfig,
    pub edges: EdgeConfig,
    pub adc: AdcConfig,
    pub session: SessionConfig,
}

impl DaqConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: DaqConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick.hz == 0 || self.tick.hz > MAX_TICK_HZ {
            return Err(DaqError::Config(format!(
                "tick.hz must be within 1..={MAX_TICK_HZ}, got {}",
                self.tick.hz
            )));
        }
        if self.logging.buffer_capacity == 0 {
            return Err(DaqError::Config("logging.buffer_capacity must be > 0".into()));
        }
        if self.adc.full_scale_counts == 0 || self.adc.reference_volts <= 0.0 {
            return Err(DaqError::Config(
                "adc full scale and reference voltage must be positive".into(),
            ));
        }
        if self.adc.brake_current_full_scale_amps <= 0.0 {
            return Err(DaqError::Config(
                "adc.brake_current_full_scale_amps must be positive".into(),
            ));
        }
        if self.pid.output_max <= 0.0 || self.pid.windup_guard < 0.0 {
            return Err(DaqError::Config(
                "pid.output_max must be positive and pid.windup_guard non-negative".into(),
            ));
        }
        if self.edges.primary_max_rpm <= 0.0 || self.edges.secondary_max_rpm <= 0.0 {
            return Err(DaqError::Config("edge rpm ceilings must be positive".into()));
        }
        if !(0.0..=100.0).contains(&self.session.launch_threshold_pct) {
            return Err(DaqError::Config(
                "session.launch_threshold_pct must be a percentage".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        DaqConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_tick_rate() {
        let mut cfg = DaqConfig::default();
        cfg.tick.hz = 5_000;
        assert!(matches!(cfg.validate(), Err(DaqError::Config(_))));
        cfg.tick.hz = 0;
        assert!(matches!(cfg.validate(), Err(DaqError::Config(_))));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: DaqConfig = serde_json::from_str(
            r#"{ "tick": { "hz": 100 }, "session": { "launch_threshold_pct": 40.0 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.tick.hz, 100);
        assert_eq!(cfg.tick.late_tolerance_us, 200);
        assert!((cfg.session.launch_threshold_pct - 40.0).abs() < f64::EPSILON);
        assert_eq!(cfg.session.engine_confirm_timeout_ms, 5_000);
        assert_eq!(cfg.logging.buffer_capacity, 1_000);
        assert!((cfg.faults.brake_current_max_amps - 3.6).abs() < f64::EPSILON);
    }

    #[test]
    fn period_matches_rate() {
        let tick = TickConfig { hz: 250, ..TickConfig::default() };
        assert_eq!(tick.period(), Duration::from_millis(4));
    }
}
