//! adc.rs
//! Simulated ADC front end with optional noise, a first-order brake-current
//! plant and scripted value injection.

use std::ops::Range;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    acquisition::adc::{Adc, AdcChannel, ChannelScale, ChannelSelection, Converter, RawChannels},
    config::AdcConfig,
    error::{DaqError, Result},
    sim::rig::RigProbe,
};

/// Brake current follows the commanded duty with a first-order lag.
struct BrakePlant {
    probe: RigProbe,
    full_scale_amps: f64,
    amps: f64,
}

impl BrakePlant {
    const GAIN: f64 = 0.2;

    fn advance(&mut self) -> f64 {
        let target = self.probe.brake_duty() / 100.0 * self.full_scale_amps;
        self.amps += (target - self.amps) * Self::GAIN;
        self.amps
    }
}

#[derive(Debug, Clone, Copy)]
struct Injection {
    from_read: usize,
    channel: AdcChannel,
    value: f64,
}

pub struct SimAdc {
    converter: Converter,
    scales: [ChannelScale; AdcChannel::COUNT],
    /// Physical value per channel before noise.
    baseline: [f64; AdcChannel::COUNT],
    noise_volts: f64,
    rng: StdRng,
    plant: Option<BrakePlant>,
    injections: Vec<Injection>,
    selection: ChannelSelection,
    reads: usize,
    fail_configure: bool,
    /// Read numbers that return an error.
    failing_reads: Range<usize>,
}

impl SimAdc {
    /// Quiet rig: 60 °C everywhere, 1 A brake current, mid-range mechanics.
    pub fn nominal(config: &AdcConfig) -> Self {
        let mut baseline = [0.0; AdcChannel::COUNT];
        baseline[AdcChannel::Torque.index()] = 1.5;
        baseline[AdcChannel::BrakeCurrent.index()] = 1.0;
        baseline[AdcChannel::LoadCell.index()] = 1.0;
        baseline[AdcChannel::ThrottlePosition.index()] = 2.0;
        for ch in AdcChannel::TEMPERATURES {
            baseline[ch.index()] = 60.0;
        }
        Self {
            converter: config.converter(),
            scales: config.scales,
            baseline,
            noise_volts: 0.0,
            rng: StdRng::seed_from_u64(0),
            plant: None,
            injections: Vec::new(),
            selection: ChannelSelection::ALL,
            reads: 0,
            fail_configure: false,
            failing_reads: 0..0,
        }
    }

    /// Uniform noise of up to `volts` on every converted channel.
    pub fn with_noise(mut self, volts: f64, seed: u64) -> Self {
        self.noise_volts = volts.abs();
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Drive the brake-current channel from the duty the rig last saw.
    pub fn with_brake_plant(mut self, probe: RigProbe, full_scale_amps: f64) -> Self {
        self.plant = Some(BrakePlant {
            probe,
            full_scale_amps,
            amps: 0.0,
        });
        self
    }

    /// From read number `from_read` (0-based) on, `channel` reports `value`
    /// in physical units.
    pub fn inject(&mut self, from_read: usize, channel: AdcChannel, value: f64) {
        self.injections.push(Injection {
            from_read,
            channel,
            value,
        });
    }

    pub fn inject_from(mut self, from_read: usize, channel: AdcChannel, value: f64) -> Self {
        self.inject(from_read, channel, value);
        self
    }

    pub fn failing_configure(config: &AdcConfig) -> Self {
        Self {
            fail_configure: true,
            ..Self::nominal(config)
        }
    }

    /// Reads numbered within `reads` (0-based) fail.
    pub fn failing_reads(mut self, reads: Range<usize>) -> Self {
        self.failing_reads = reads;
        self
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    fn counts_for(&self, channel: AdcChannel, value: f64) -> u16 {
        let scale = self.scales[channel.index()];
        let volts = if scale.scale == 0.0 {
            0.0
        } else {
            (value - scale.offset) / scale.scale
        };
        self.converter.counts_for_volts(volts)
    }
}

impl Adc for SimAdc {
    fn configure(&mut self, selection: ChannelSelection) -> Result<()> {
        if self.fail_configure {
            return Err(DaqError::Adc("conversion sequence rejected".into()));
        }
        self.selection = selection;
        Ok(())
    }

    fn read(&mut self, selection: ChannelSelection) -> Result<RawChannels> {
        if self.failing_reads.contains(&self.reads) {
            self.reads += 1;
            return Err(DaqError::Adc("conversion timed out".into()));
        }
        let mut values = self.baseline;
        if let Some(plant) = self.plant.as_mut() {
            values[AdcChannel::BrakeCurrent.index()] = plant.advance();
        }
        for inj in self.injections.iter().filter(|i| self.reads >= i.from_read) {
            values[inj.channel.index()] = inj.value;
        }

        let mut raw = RawChannels::default();
        // only channels in the configured sequence are converted
        for channel in selection.channels().filter(|c| self.selection.contains(*c)) {
            let mut counts = self.counts_for(channel, values[channel.index()]);
            if self.noise_volts > 0.0 {
                let jitter = self.rng.random_range(-self.noise_volts..=self.noise_volts);
                let noisy = self.converter.volts(counts) + jitter;
                counts = self.converter.counts_for_volts(noisy);
            }
            raw.set(channel, counts);
        }
        self.reads += 1;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_readings_convert_back() {
        let config = AdcConfig::default();
        let mut adc = SimAdc::nominal(&config);
        let raw = adc.read(ChannelSelection::ALL).unwrap();
        let phys = config.converter().convert(&raw);
        assert!((phys.temp1_c - 60.0).abs() < 0.2);
        assert!((phys.brake_current_amps - 1.0).abs() < 0.01);
    }

    #[test]
    fn injection_applies_from_its_read() {
        let config = AdcConfig::default();
        let mut adc = SimAdc::nominal(&config).inject_from(1, AdcChannel::BrakeCurrent, 4.0);
        let conv = config.converter();
        let first = conv.convert(&adc.read(ChannelSelection::ALL).unwrap());
        let second = conv.convert(&adc.read(ChannelSelection::ALL).unwrap());
        assert!(first.brake_current_amps < 1.1);
        assert!((second.brake_current_amps - 4.0).abs() < 0.01);
        assert_eq!(adc.reads(), 2);
    }

    #[test]
    fn unselected_channels_read_zero() {
        let config = AdcConfig::default();
        let mut adc = SimAdc::nominal(&config);
        let raw = adc.read(ChannelSelection::TEMPERATURES).unwrap();
        assert_eq!(raw.get(AdcChannel::Torque), 0);
        assert!(raw.get(AdcChannel::Temp1) > 0);
    }

    #[test]
    fn noise_stays_within_its_band() {
        let config = AdcConfig::default();
        let mut adc = SimAdc::nominal(&config).with_noise(0.01, 3);
        let conv = config.converter();
        let torque: Vec<f64> = (0..50)
            .map(|_| conv.convert(&adc.read(ChannelSelection::ALL).unwrap()).torque)
            .collect();
        assert!(torque.iter().all(|t| (t - 1.5).abs() < 0.02));
        assert!(torque.iter().any(|t| (t - torque[0]).abs() > 0.0));
    }

    #[test]
    fn scripted_read_failures() {
        let config = AdcConfig::default();
        let mut adc = SimAdc::nominal(&config).failing_reads(1..3);
        assert!(adc.read(ChannelSelection::ALL).is_ok());
        assert!(matches!(adc.read(ChannelSelection::ALL), Err(DaqError::Adc(_))));
        assert!(adc.read(ChannelSelection::ALL).is_err());
        assert!(adc.read(ChannelSelection::ALL).is_ok());
        assert_eq!(adc.reads(), 4);
    }
}
