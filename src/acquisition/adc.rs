//! adc.rs
//! Eight-channel ADC seen through its collaborator interface.
//!
//! The register protocol and I2C transport live behind the `Adc` trait; this
//! module owns the channel map, channel-selection masks and the conversion
//! from raw counts to volts to physical units.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Channel map of the DAQ board (channel 1..8 on the schematic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdcChannel {
    Torque,
    Temp3,
    BeltTemp,
    Temp2,
    BrakeCurrent,
    Temp1,
    LoadCell,
    ThrottlePosition,
}

impl AdcChannel {
    pub const COUNT: usize = 8;

    pub const ALL: [AdcChannel; Self::COUNT] = [
        AdcChannel::Torque,
        AdcChannel::Temp3,
        AdcChannel::BeltTemp,
        AdcChannel::Temp2,
        AdcChannel::BrakeCurrent,
        AdcChannel::Temp1,
        AdcChannel::LoadCell,
        AdcChannel::ThrottlePosition,
    ];

    pub const TEMPERATURES: [AdcChannel; 4] = [
        AdcChannel::Temp1,
        AdcChannel::Temp2,
        AdcChannel::Temp3,
        AdcChannel::BeltTemp,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit of this channel in the configuration register.
    #[inline]
    pub fn mask_bit(self) -> u16 {
        1 << (4 + self.index())
    }
}

/// Channel-selection bits of the ADC configuration register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSelection(pub u16);

impl ChannelSelection {
    /// Torque, belt temp, brake current, load cell.
    pub const CONTROL: ChannelSelection = ChannelSelection(0b0000_0101_0101_0000);
    /// Temperatures only.
    pub const TEMPERATURES: ChannelSelection = ChannelSelection(0b0000_0010_1110_0000);
    pub const ALL: ChannelSelection = ChannelSelection(0b0000_1111_1111_0000);

    #[inline]
    pub fn contains(self, channel: AdcChannel) -> bool {
        self.0 & channel.mask_bit() != 0
    }

    pub fn channels(self) -> impl Iterator<Item = AdcChannel> {
        AdcChannel::ALL.into_iter().filter(move |ch| self.contains(*ch))
    }
}

/// One conversion sequence; channels outside the selection read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawChannels {
    pub counts: [u16; AdcChannel::COUNT],
}

impl RawChannels {
    #[inline]
    pub fn get(&self, channel: AdcChannel) -> u16 {
        self.counts[channel.index()]
    }

    #[inline]
    pub fn set(&mut self, channel: AdcChannel, counts: u16) {
        self.counts[channel.index()] = counts;
    }
}

/// External ADC collaborator.
pub trait Adc: Send {
    fn configure(&mut self, selection: ChannelSelection) -> Result<()>;
    fn read(&mut self, selection: ChannelSelection) -> Result<RawChannels>;
}

/// y = scale * volts + offset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelScale {
    pub scale: f64,
    pub offset: f64,
}

impl ChannelScale {
    pub const IDENTITY: ChannelScale = ChannelScale { scale: 1.0, offset: 0.0 };

    #[inline]
    pub fn apply(&self, volts: f64) -> f64 {
        self.scale * volts + self.offset
    }
}

/// Physical quantities derived from one conversion sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhysicalReadings {
    pub torque: f64,
    pub temp1_c: f64,
    pub temp2_c: f64,
    pub temp3_c: f64,
    pub belt_temp_c: f64,
    pub brake_current_amps: f64,
    pub load: f64,
    pub throttle_position: f64,
    /// Highest input voltage seen across the selected channels.
    pub max_input_volts: f64,
}

impl PhysicalReadings {
    pub fn max_temperature_c(&self) -> f64 {
        self.temp1_c
            .max(self.temp2_c)
            .max(self.temp3_c)
            .max(self.belt_temp_c)
    }
}

/// Counts → volts → units, using the configured full scale and per-channel scales.
#[derive(Debug, Clone)]
pub struct Converter {
    full_scale_counts: f64,
    reference_volts: f64,
    scales: [ChannelScale; AdcChannel::COUNT],
}

impl Converter {
    pub fn new(
        full_scale_counts: u16,
        reference_volts: f64,
        scales: [ChannelScale; AdcChannel::COUNT],
    ) -> Self {
        Self {
            full_scale_counts: f64::from(full_scale_counts),
            reference_volts,
            scales,
        }
    }

    #[inline]
    pub fn volts(&self, counts: u16) -> f64 {
        f64::from(counts) / self.full_scale_counts * self.reference_volts
    }

    /// Inverse of `volts`, rounded and saturated to the converter range.
    pub fn counts_for_volts(&self, volts: f64) -> u16 {
        let counts = (volts / self.reference_volts * self.full_scale_counts).round();
        counts.clamp(0.0, self.full_scale_counts) as u16
    }

    #[inline]
    pub fn physical(&self, channel: AdcChannel, counts: u16) -> f64 {
        self.scales[channel.index()].apply(self.volts(counts))
    }

    pub fn convert(&self, raw: &RawChannels) -> PhysicalReadings {
        let max_input_volts = raw
            .counts
            .iter()
            .map(|&c| self.volts(c))
            .fold(0.0, f64::max);

        PhysicalReadings {
            torque: self.physical(AdcChannel::Torque, raw.get(AdcChannel::Torque)),
            temp1_c: self.physical(AdcChannel::Temp1, raw.get(AdcChannel::Temp1)),
            temp2_c: self.physical(AdcChannel::Temp2, raw.get(AdcChannel::Temp2)),
            temp3_c: self.physical(AdcChannel::Temp3, raw.get(AdcChannel::Temp3)),
            belt_temp_c: self.physical(AdcChannel::BeltTemp, raw.get(AdcChannel::BeltTemp)),
            brake_current_amps: self
                .physical(AdcChannel::BrakeCurrent, raw.get(AdcChannel::BrakeCurrent)),
            load: self.physical(AdcChannel::LoadCell, raw.get(AdcChannel::LoadCell)),
            throttle_position: self.physical(
                AdcChannel::ThrottlePosition,
                raw.get(AdcChannel::ThrottlePosition),
            ),
            max_input_volts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> Converter {
        let mut scales = [ChannelScale::IDENTITY; AdcChannel::COUNT];
        scales[AdcChannel::Temp1.index()] = ChannelScale { scale: 100.0, offset: -10.0 };
        Converter::new(4_095, 5.0, scales)
    }

    #[test]
    fn selection_masks_match_channel_map() {
        let control: Vec<_> = ChannelSelection::CONTROL.channels().collect();
        assert_eq!(
            control,
            vec![
                AdcChannel::Torque,
                AdcChannel::BeltTemp,
                AdcChannel::BrakeCurrent,
                AdcChannel::LoadCell
            ]
        );
        assert!(ChannelSelection::TEMPERATURES.channels().all(|c| AdcChannel::TEMPERATURES.contains(&c)));
        assert_eq!(ChannelSelection::ALL.channels().count(), AdcChannel::COUNT);
    }

    #[test]
    fn counts_convert_to_volts_and_units() {
        let conv = converter();
        assert!((conv.volts(4_095) - 5.0).abs() < 1e-9);
        assert!(conv.volts(0).abs() < 1e-9);

        let mut raw = RawChannels::default();
        raw.set(AdcChannel::Temp1, 819); // ~1.0 V
        let phys = conv.convert(&raw);
        assert!((phys.temp1_c - 90.0).abs() < 0.1);
        assert!((phys.max_input_volts - 1.0).abs() < 0.01);
    }

    #[test]
    fn counts_for_volts_saturates() {
        let conv = converter();
        assert_eq!(conv.counts_for_volts(10.0), 4_095);
        assert_eq!(conv.counts_for_volts(-1.0), 0);
        assert_eq!(conv.counts_for_volts(2.5), 2_048);
    }
}
