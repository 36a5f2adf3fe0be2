//! Everything a run is parameterized with. A [PipelineConfig] can be built
//! in code, or read from a [RON](https://github.com/ron-rs/ron) file such as:
//!
//! ```text
//! (
//!     speakers: [FL, FR],
//!     silence_length: 2.0,
//!     compensate_headphones: true,
//!     speaker_delays: {FL: 0.107, FR: 0.107, FC: 0.214, BL: 0.107, BR: 0.107, SL: 0.0, SR: 0.0},
//! )
//! ```
//!
//! Fields that are left out take their default values.

use crate::channel::{ChannelOrder, Speaker};
use crate::deconvolve::DeconvolutionMethod;
use crate::error::{ImpulciferError, Result};

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

/// Propagation delay, in milliseconds, from each speaker to the ear nearest
/// to it relative to the center of the head. The defaults describe speakers
/// on a circle around the listening position: side speakers are in line
/// with the ears, front and back speakers are slightly further away and the
/// center speaker is the furthest from either ear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeakerDelayTable(BTreeMap<Speaker, f64>);

impl SpeakerDelayTable {
    /// Builds a table from explicit `(speaker, ms)` pairs.
    pub fn new(delays: impl IntoIterator<Item = (Speaker, f64)>) -> Self {
        Self(delays.into_iter().collect())
    }

    /// A table where every speaker has no delay.
    pub fn zero() -> Self {
        Self::new(Speaker::ALL.iter().map(|&s| (s, 0.0)))
    }

    /// Delay for a speaker in milliseconds.
    pub fn delay_ms(&self, speaker: Speaker) -> Result<f64> {
        self.0.get(&speaker).copied().ok_or_else(|| {
            ImpulciferError::Configuration(format!("no delay configured for speaker {speaker}"))
        })
    }

    /// Delay for a speaker in whole samples at the given rate.
    pub fn delay_samples(&self, speaker: Speaker, sample_rate: u32) -> Result<usize> {
        let ms = self.delay_ms(speaker)?;
        if ms < 0.0 {
            return Err(ImpulciferError::Configuration(format!(
                "negative delay of {ms} ms for speaker {speaker}"
            )));
        }
        Ok((ms / 1000.0 * sample_rate as f64).round() as usize)
    }
}

impl Default for SpeakerDelayTable {
    fn default() -> Self {
        Self::new([
            (Speaker::FL, 0.107),
            (Speaker::FR, 0.107),
            (Speaker::FC, 0.214),
            (Speaker::BL, 0.107),
            (Speaker::BR, 0.107),
            (Speaker::SL, 0.0),
            (Speaker::SR, 0.0),
        ])
    }
}

/// All the knobs of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Order the speakers were measured in. The recording holds one sweep
    /// per speaker, two tracks (left and right ear) per sweep.
    pub speakers: Vec<Speaker>,

    /// Silence in seconds at the beginning, end and between sweeps. Must be
    /// a whole number of samples at the recording's sampling rate.
    pub silence_length: f64,

    /// RMS window used for decay analysis, in milliseconds.
    pub rms_window_ms: f64,

    /// Peak level the outputs are normalized to, in dBFS.
    pub target_level_db: f64,

    /// Lowest frequency of the sweep, in Hz.
    pub low_frequency: f64,

    /// Highest frequency of the sweep, in Hz.
    pub high_frequency: f64,

    /// Silent samples kept before the first arrival. `None` means one
    /// millisecond at the recording's sampling rate.
    pub head_room: Option<usize>,

    /// Equalize the headphones with a headphone sweep recording.
    pub compensate_headphones: bool,

    /// How impulse responses are recovered from the sweeps.
    pub method: DeconvolutionMethod,

    /// Speaker to ear delays.
    pub speaker_delays: SpeakerDelayTable,

    /// Layout of the main HRIR output.
    pub channel_order: ChannelOrder,

    /// Layout of the HeSuVi output.
    pub hesuvi_order: ChannelOrder,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            speakers: Vec::new(),
            silence_length: 0.0,
            rms_window_ms: 1.0,
            target_level_db: -0.1,
            low_frequency: 20.0,
            high_frequency: 20000.0,
            head_room: None,
            compensate_headphones: false,
            method: DeconvolutionMethod::default(),
            speaker_delays: SpeakerDelayTable::default(),
            channel_order: ChannelOrder::canonical(),
            hesuvi_order: ChannelOrder::hesuvi(),
        }
    }
}

impl PipelineConfig {
    /// Read a configuration from the RON file at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Parse a configuration from RON text.
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::de::from_str(text)?)
    }

    /// Write this configuration as pretty printed RON.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Head room in samples at the given rate.
    pub fn head_room_samples(&self, sample_rate: u32) -> usize {
        self.head_room
            .unwrap_or_else(|| (sample_rate / 1000) as usize)
    }

    /// Checks the parameters that do not depend on the signals.
    pub fn validate(&self) -> Result<()> {
        if self.speakers.is_empty() {
            return Err(ImpulciferError::Configuration(
                "no speakers declared".to_string(),
            ));
        }
        if self.silence_length.is_nan() || self.silence_length < 0.0 {
            return Err(ImpulciferError::Configuration(format!(
                "silence length must not be negative, got {}",
                self.silence_length
            )));
        }
        if self.rms_window_ms.is_nan() || self.rms_window_ms <= 0.0 {
            return Err(ImpulciferError::Configuration(format!(
                "RMS window must be positive, got {} ms",
                self.rms_window_ms
            )));
        }
        if !(self.low_frequency > 0.0 && self.high_frequency > self.low_frequency) {
            return Err(ImpulciferError::Configuration(format!(
                "invalid sweep band {} Hz .. {} Hz",
                self.low_frequency, self.high_frequency
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delays() {
        let table = SpeakerDelayTable::default();
        assert_eq!(table.delay_ms(Speaker::FC).unwrap(), 0.214);
        assert_eq!(table.delay_samples(Speaker::FL, 48000).unwrap(), 5);
        assert_eq!(table.delay_samples(Speaker::SL, 48000).unwrap(), 0);
    }

    #[test]
    fn missing_delay_is_a_configuration_error() {
        let table = SpeakerDelayTable::new([(Speaker::FL, 0.1)]);
        assert!(matches!(
            table.delay_ms(Speaker::FR),
            Err(ImpulciferError::Configuration(_))
        ));
    }

    #[test]
    fn partial_ron_uses_defaults() {
        let config = PipelineConfig::from_ron(
            "(speakers: [FL, FR], silence_length: 0.5, compensate_headphones: true)",
        )
        .unwrap();
        assert_eq!(config.speakers, vec![Speaker::FL, Speaker::FR]);
        assert_eq!(config.silence_length, 0.5);
        assert!(config.compensate_headphones);
        assert_eq!(config.rms_window_ms, 1.0);
        assert_eq!(config.channel_order, ChannelOrder::canonical());
    }

    #[test]
    fn channel_orders_read_as_labels() {
        let config =
            PipelineConfig::from_ron("(hesuvi_order: [\"FL-left\", \"FL-right\"])").unwrap();
        assert_eq!(config.hesuvi_order.len(), 2);

        let bad = PipelineConfig::from_ron("(hesuvi_order: [\"LFE-left\"])");
        assert!(matches!(bad, Err(ImpulciferError::Ron(_))));
    }

    #[test]
    fn write_and_read_path() {
        let tempfile = tempfile::NamedTempFile::new().unwrap();
        let config = PipelineConfig {
            speakers: vec![Speaker::SL, Speaker::SR],
            silence_length: 1.0,
            speaker_delays: SpeakerDelayTable::zero(),
            ..Default::default()
        };
        config.to_path(tempfile.path()).unwrap();
        assert_eq!(PipelineConfig::from_path(tempfile.path()).unwrap(), config);
    }

    #[test]
    fn validation() {
        assert!(PipelineConfig::default().validate().is_err());
        let config = PipelineConfig {
            speakers: vec![Speaker::FL],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        let config = PipelineConfig {
            low_frequency: 30000.0,
            ..config
        };
        assert!(matches!(
            config.validate(),
            Err(ImpulciferError::Configuration(_))
        ));
    }

    #[test]
    fn head_room_defaults_to_one_millisecond() {
        let config = PipelineConfig::default();
        assert_eq!(config.head_room_samples(48000), 48);
        let config = PipelineConfig {
            head_room: Some(10),
            ..config
        };
        assert_eq!(config.head_room_samples(48000), 10);
    }
}
