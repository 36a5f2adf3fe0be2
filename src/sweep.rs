//! The reference sweep every recording is deconvolved against.

use crate::error::{ImpulciferError, Result};
use crate::signal::MultichannelSignal;

use log::warn;
use std::f64::consts::PI;

/// A mono logarithmic sine sweep together with the band it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSweep {
    samples: Vec<f64>,
    sample_rate: u32,
    low: f64,
    high: f64,
}

impl ReferenceSweep {
    /// Wraps existing sweep samples.
    pub fn new(samples: Vec<f64>, sample_rate: u32, low: f64, high: f64) -> Result<Self> {
        if samples.is_empty() {
            return Err(ImpulciferError::Configuration(
                "reference sweep is empty".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(ImpulciferError::Configuration(
                "reference sweep has no sampling rate".to_string(),
            ));
        }
        if !(low > 0.0 && high > low) {
            return Err(ImpulciferError::Configuration(format!(
                "invalid sweep band {low} Hz .. {high} Hz"
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            low,
            high,
        })
    }

    /// Takes the sweep from the first track of a signal read from file.
    pub fn from_signal(signal: MultichannelSignal, low: f64, high: f64) -> Result<Self> {
        let sample_rate = signal.sample_rate();
        if signal.n_tracks() > 1 {
            warn!(
                "reference sweep has {} tracks, using the first one",
                signal.n_tracks()
            );
        }
        let samples = signal.into_tracks().into_iter().next().unwrap_or_default();
        Self::new(samples, sample_rate, low, high)
    }

    /// Generates an exponential sine sweep from `low` to `high` Hz lasting
    /// `duration` seconds.
    pub fn exponential(sample_rate: u32, duration: f64, low: f64, high: f64) -> Result<Self> {
        if duration.is_nan() || duration <= 0.0 {
            return Err(ImpulciferError::Configuration(format!(
                "sweep duration must be positive, got {duration}"
            )));
        }
        if high >= sample_rate as f64 / 2.0 {
            return Err(ImpulciferError::Configuration(format!(
                "sweep end {high} Hz is above Nyquist for {sample_rate} Hz"
            )));
        }
        let n = (duration * sample_rate as f64).round() as usize;
        let rate = (high / low).ln();
        let k = 2.0 * PI * low * duration / rate;
        let samples = (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (k * ((t / duration * rate).exp() - 1.0)).sin()
            })
            .collect();
        Self::new(samples, sample_rate, low, high)
    }

    /// The sweep samples.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Sampling rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Start frequency of the sweep in Hz.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// End frequency of the sweep in Hz.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Length in samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false, a sweep can not be built without samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_sweep_shape() {
        let sweep = ReferenceSweep::exponential(48000, 0.5, 20.0, 20000.0).unwrap();
        assert_eq!(sweep.len(), 24000);
        assert_eq!(sweep.duration(), 0.5);
        assert!(sweep.samples().iter().all(|x| x.abs() <= 1.0));
        // starts at zero phase
        assert!(sweep.samples()[0].abs() < 1e-12);
    }

    #[test]
    fn sweep_frequency_rises() {
        // count zero crossings in the first and last tenth
        let sweep = ReferenceSweep::exponential(48000, 1.0, 20.0, 20000.0).unwrap();
        let crossings = |s: &[f64]| s.windows(2).filter(|w| w[0].signum() != w[1].signum()).count();
        let tenth = sweep.len() / 10;
        let early = crossings(&sweep.samples()[..tenth]);
        let late = crossings(&sweep.samples()[sweep.len() - tenth..]);
        assert!(late > 10 * early);
    }

    #[test]
    fn invalid_sweeps() {
        assert!(ReferenceSweep::exponential(48000, 0.0, 20.0, 20000.0).is_err());
        assert!(ReferenceSweep::exponential(32000, 1.0, 20.0, 20000.0).is_err());
        assert!(ReferenceSweep::new(vec![], 48000, 20.0, 20000.0).is_err());
        assert!(ReferenceSweep::new(vec![0.0], 0, 20.0, 20000.0).is_err());
    }

    #[test]
    fn from_signal_takes_first_track() {
        let signal = MultichannelSignal::builder()
            .set_samplerate(44100)
            .add_track(&[0.5, -0.5])
            .add_track(&[1.0, 1.0])
            .build()
            .unwrap();
        let sweep = ReferenceSweep::from_signal(signal, 20.0, 20000.0).unwrap();
        assert_eq!(sweep.samples(), &[0.5, -0.5]);
        assert_eq!(sweep.sample_rate(), 44100);
    }
}
