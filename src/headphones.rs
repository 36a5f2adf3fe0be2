//! Headphone compensation. The headphones are measured with the same in-ear
//! microphones and sweep as the speakers, one side at a time. The inverse of
//! each side's response becomes a minimum phase filter that is applied to
//! every impulse response heard by that ear.

use crate::channel::{Ear, Speaker};
use crate::deconvolve::{DeconvolutionMethod, Deconvolver};
use crate::error::{ImpulciferError, Result};
use crate::frequency_response::FrequencyResponse;
use crate::signal::{MultichannelSignal, TrackSet};
use crate::spectral::{convolve_causal, magnitude_response};
use crate::splitter::Splitter;
use crate::stage::Stage;
use crate::sweep::ReferenceSweep;

use log::{debug, info};
use std::fmt;

/// Largest boost the equalization may apply, in dB.
const MAX_GAIN_DB: f64 = 20.0;

/// The equalization fades to 0 dB over this band.
const TREBLE_FADE: (f64, f64) = (20000.0, 22000.0);

/// Band over which the two ears are leveled against each other.
const LEVELING_BAND: (f64, f64) = (100.0, 10000.0);

/// Frequency resolution of the equalization filters in Hz.
const FILTER_RESOLUTION: f64 = 2.0;

/// Equalization for one ear, from the measured response to the filter
/// curve. Returns the measured response on the standard grid and the
/// equalization curve on the same grid.
pub fn ear_equalization(
    measured: &FrequencyResponse,
) -> Result<(FrequencyResponse, FrequencyResponse)> {
    let measured = measured.interpolate();
    let zero = FrequencyResponse::flat(measured.frequency().to_vec())?;
    let equalization = measured
        .centered()
        .compensated(&zero)
        .smoothed()
        .equalization(MAX_GAIN_DB, TREBLE_FADE.0, TREBLE_FADE.1);
    Ok((measured, equalization))
}

/// Shifts the right ear's equalization so that both equalized responses
/// have the same mean level over [LEVELING_BAND]. The left ear is the
/// reference. Each argument is a `(measured, equalization)` pair.
pub fn level_ears(
    left: (&FrequencyResponse, &FrequencyResponse),
    right: (&FrequencyResponse, &FrequencyResponse),
) -> Result<FrequencyResponse> {
    let mean = |(measured, eq): (&FrequencyResponse, &FrequencyResponse)| {
        measured
            .equalized(eq)
            .band_mean(LEVELING_BAND.0, LEVELING_BAND.1)
    };
    let shift = mean(left)? - mean(right)?;
    debug!("leveling right ear by {:.3} dB", shift);
    Ok(right.1.shifted(shift))
}

/// Equalizes a set of impulse responses for the headphones they will be
/// listened with.
#[derive(Debug, Clone)]
pub struct HeadphoneCompensator {
    recording: MultichannelSignal,
    reference: ReferenceSweep,
    silence_length: f64,
}

impl HeadphoneCompensator {
    /// `recording` is a stereo recording of the sweep played first on the
    /// left and then on the right headphone driver, laid out like a speaker
    /// recording of `FL,FR`.
    pub fn new(recording: MultichannelSignal, reference: ReferenceSweep, silence_length: f64) -> Self {
        Self {
            recording,
            reference,
            silence_length,
        }
    }

    /// Measured frequency responses of the left driver at the left ear and
    /// the right driver at the right ear.
    pub fn measure(&self) -> Result<(FrequencyResponse, FrequencyResponse)> {
        let sample_rate = self.recording.sample_rate();
        let split = Splitter::new(
            vec![Speaker::FL, Speaker::FR],
            self.reference.len(),
            self.silence_length,
        )
        .convert(self.recording.clone())?;

        let measure_ear = |speaker: Speaker, ear: Ear| -> Result<FrequencyResponse> {
            let track = split.track(speaker, ear).ok_or_else(|| {
                ImpulciferError::Configuration(format!(
                    "headphone recording is missing {}",
                    speaker.at(ear)
                ))
            })?;
            let deconvolver = Deconvolver::new(
                DeconvolutionMethod::InverseFilter,
                &self.reference,
                track.len(),
                Some(sample_rate),
            )?;
            let ir = deconvolver.deconvolve(&track.samples)?;
            let (frequency, magnitude) = magnitude_response(&ir, sample_rate);
            // 0 Hz does not fit on a logarithmic axis
            FrequencyResponse::new(frequency[1..].to_vec(), magnitude[1..].to_vec())
        };

        Ok((
            measure_ear(Speaker::FL, Ear::Left)?,
            measure_ear(Speaker::FR, Ear::Right)?,
        ))
    }

    /// Leveled equalization curves for the left and the right ear.
    pub fn equalizations(&self) -> Result<(FrequencyResponse, FrequencyResponse)> {
        let (left, right) = self.measure()?;
        let (left_measured, left_eq) = ear_equalization(&left)?;
        let (right_measured, right_eq) = ear_equalization(&right)?;
        let right_eq = level_ears((&left_measured, &left_eq), (&right_measured, &right_eq))?;
        Ok((left_eq, right_eq))
    }

    /// Minimum phase equalization filters for the left and the right ear.
    pub fn filters(&self, sample_rate: u32) -> Result<(Vec<f64>, Vec<f64>)> {
        let (left, right) = self.equalizations()?;
        Ok((
            left.minimum_phase_impulse_response(sample_rate, FILTER_RESOLUTION)?,
            right.minimum_phase_impulse_response(sample_rate, FILTER_RESOLUTION)?,
        ))
    }
}

impl Stage for HeadphoneCompensator {
    type InData = TrackSet;
    type OutData = TrackSet;

    fn convert(&self, input: TrackSet) -> Result<TrackSet> {
        if self.recording.sample_rate() != input.sample_rate() {
            return Err(ImpulciferError::SampleRateMismatch {
                recording: self.recording.sample_rate(),
                reference: input.sample_rate(),
            });
        }
        let (left, right) = self.filters(input.sample_rate())?;
        info!("equalizing with {} tap headphone filters", left.len());

        Ok(input.map_samples(|label, samples| match label.ear {
            Ear::Left => convolve_causal(&samples, &left),
            Ear::Right => convolve_causal(&samples, &right),
        }))
    }
}

impl fmt::Display for HeadphoneCompensator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeadphoneCompensator")
    }
}
