//! Deconvolution of sweep recordings into impulse responses.
//!
//! Two methods are available:
//!
//! - [DeconvolutionMethod::InverseFilter]: convolve the recording with the
//!   time reversed sweep. A logarithmic sweep spends equal time in every
//!   octave, so it carries more energy per Hz at low frequencies; the
//!   reversed sweep is weighted with an exponential that decays 6 dB per
//!   octave to flatten that out.
//! - [DeconvolutionMethod::Fft]: divide the recording's spectrum by the
//!   sweep's. Simple, but bins where the sweep has next to no energy blow
//!   up.
//!
//! Both return `L + 1` samples where `L` is the common (zero padded) length
//! of the recording and the sweep, and sample 0 is zero lag: a recording
//! that is the sweep itself comes out as an impulse at index 0.

use crate::error::{ImpulciferError, Result};
use crate::signal::{Track, TrackSet};
use crate::spectral::{dft_bin_magnitude, fft_convolve, to_complex};
use crate::stage::Stage;
use crate::sweep::ReferenceSweep;

use log::debug;
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Reference spectrum bins with less power than this are zeroed instead of
/// divided by.
const MIN_BIN_POWER: f64 = 1e-30;

/// How an impulse response is recovered from a sweep recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeconvolutionMethod {
    /// Convolution with an energy corrected, time reversed sweep
    #[default]
    InverseFilter,
    /// Spectral division
    Fft,
}

impl FromStr for DeconvolutionMethod {
    type Err = ImpulciferError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inverse_filter" => Ok(Self::InverseFilter),
            "fft" => Ok(Self::Fft),
            other => Err(ImpulciferError::Configuration(format!(
                "\"{other}\" is not one of the supported deconvolution methods \"inverse_filter\" or \"fft\""
            ))),
        }
    }
}

impl fmt::Display for DeconvolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InverseFilter => write!(f, "inverse_filter"),
            Self::Fft => write!(f, "fft"),
        }
    }
}

/// Deconvolves recordings of one length against one reference sweep. The
/// filter depends only on the sweep and the length, so it is built once and
/// shared by every track.
#[derive(Debug, Clone)]
pub struct Deconvolver {
    method: DeconvolutionMethod,
    len: usize,
    kernel: Kernel,
}

#[derive(Debug, Clone)]
enum Kernel {
    /// Energy normalized inverse filter, as long as the sweep
    InverseFilter(Vec<f64>),
    /// Spectrum of the zero padded reference, `len` bins
    Spectrum(Vec<Complex<f64>>),
}

impl Deconvolver {
    /// Prepares deconvolution of recordings `recording_len` samples long.
    /// The inverse filter method needs the sampling rate to place the sweep's
    /// band; leaving it out is a [ImpulciferError::Configuration].
    pub fn new(
        method: DeconvolutionMethod,
        reference: &ReferenceSweep,
        recording_len: usize,
        sample_rate: Option<u32>,
    ) -> Result<Self> {
        let len = recording_len.max(reference.len());

        let kernel = match method {
            DeconvolutionMethod::InverseFilter => {
                let sample_rate = sample_rate.filter(|&fs| fs > 0).ok_or_else(|| {
                    ImpulciferError::Configuration(
                        "sampling rate is required for inverse filter deconvolution".to_string(),
                    )
                })?;
                Kernel::InverseFilter(inverse_filter(
                    reference.samples(),
                    sample_rate,
                    reference.low(),
                    reference.high(),
                ))
            }
            DeconvolutionMethod::Fft => {
                let mut spectrum = to_complex(reference.samples(), len);
                FftPlanner::<f64>::new()
                    .plan_fft_forward(len)
                    .process(&mut spectrum);
                Kernel::Spectrum(spectrum)
            }
        };

        Ok(Self {
            method,
            len,
            kernel,
        })
    }

    /// Length of every impulse response this deconvolver produces.
    pub fn output_len(&self) -> usize {
        self.len + 1
    }

    #[allow(missing_docs)]
    pub fn method(&self) -> DeconvolutionMethod {
        self.method
    }

    /// Recovers the impulse response from one recorded track. The track is
    /// zero padded to the common length; longer tracks are an error.
    pub fn deconvolve(&self, recording: &[f64]) -> Result<Vec<f64>> {
        if recording.len() > self.len {
            return Err(ImpulciferError::Configuration(format!(
                "track of {} samples is longer than the {} samples the deconvolver was built for",
                recording.len(),
                self.len
            )));
        }
        let mut padded = recording.to_vec();
        padded.resize(self.len, 0.0);

        let mut h = match &self.kernel {
            Kernel::InverseFilter(filter) => {
                // zero lag of the full convolution is the last filter tap
                let full = fft_convolve(&padded, filter);
                full.into_iter().skip(filter.len() - 1).collect::<Vec<f64>>()
            }
            Kernel::Spectrum(reference) => {
                let mut spectrum = to_complex(&padded, self.len);
                let mut planner = FftPlanner::<f64>::new();
                planner.plan_fft_forward(self.len).process(&mut spectrum);
                for (y, x) in spectrum.iter_mut().zip(reference.iter()) {
                    let power = x.norm_sqr();
                    *y = if power > MIN_BIN_POWER {
                        *y * x.conj() / power
                    } else {
                        Complex::new(0.0, 0.0)
                    };
                }
                planner.plan_fft_inverse(self.len).process(&mut spectrum);
                let norm = 1.0 / self.len as f64;
                spectrum.iter().map(|c| c.re * norm).collect()
            }
        };
        h.resize(self.output_len(), 0.0);
        Ok(h)
    }
}

/// Builds the energy normalized inverse filter for a sweep.
fn inverse_filter(sweep: &[f64], sample_rate: u32, low: f64, high: f64) -> Vec<f64> {
    let n = sweep.len();
    let w1 = low / sample_rate as f64 * 2.0 * std::f64::consts::PI;
    let w2 = high / sample_rate as f64 * 2.0 * std::f64::consts::PI;

    // amplitude at the end of the filter relative to the start: -6 dB per
    // octave over the sweep's band
    let k_end = 10f64.powf(-6.0 * (w2 / w1).log2() / 20.0);
    let k = k_end.ln() / n as f64;

    let mut filter: Vec<f64> = sweep
        .iter()
        .rev()
        .enumerate()
        .map(|(t, x)| x * (t as f64 * k).exp())
        .collect();

    // normalize with a single bin of the filtered sweep's spectrum, taken at
    // a quarter of its length (half Nyquist), which is well inside the band
    let probe = fft_convolve(&filter, sweep);
    let bin = (probe.len() as f64 / 4.0).round() as usize;
    let gain = dft_bin_magnitude(&probe, bin);
    debug!("inverse filter of {n} samples, probe bin {bin} gain {gain}");
    if gain > 0.0 {
        for x in &mut filter {
            *x /= gain;
        }
    }
    filter
}

/// Deconvolves every track of a set of sweep recordings. Silent tracks are
/// not deconvolved, they come out as silent responses of the same length.
#[derive(Debug, Clone)]
pub struct DeconvolutionStage {
    method: DeconvolutionMethod,
    reference: ReferenceSweep,
}

impl DeconvolutionStage {
    #[allow(missing_docs)]
    pub fn new(method: DeconvolutionMethod, reference: ReferenceSweep) -> Self {
        Self { method, reference }
    }
}

impl Stage for DeconvolutionStage {
    type InData = TrackSet;
    type OutData = TrackSet;

    fn convert(&self, sweeps: TrackSet) -> Result<TrackSet> {
        let sample_rate = sweeps.sample_rate();
        let deconvolver = Deconvolver::new(
            self.method,
            &self.reference,
            sweeps.max_len(),
            Some(sample_rate),
        )?;

        let tracks = sweeps
            .into_tracks()
            .into_par_iter()
            .map(|track| {
                if track.is_silent() {
                    return Ok(Track::silent(track.label, deconvolver.output_len()));
                }
                debug!("deconvolving {}", track.label);
                Ok(Track::new(track.label, deconvolver.deconvolve(&track.samples)?))
            })
            .collect::<Result<Vec<Track>>>()?;
        Ok(TrackSet::new(sample_rate, tracks))
    }
}

impl fmt::Display for DeconvolutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deconvolver ({})", self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Ear, Speaker};

    fn reference() -> ReferenceSweep {
        ReferenceSweep::exponential(48000, 0.25, 20.0, 20000.0).unwrap()
    }

    fn argmax_abs(x: &[f64]) -> usize {
        x.iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap()
    }

    fn assert_unit_impulse_at(h: &[f64], index: usize, tolerance: f64) {
        let peak = argmax_abs(h);
        assert_eq!(peak, index);
        assert!(
            (h[peak] - 1.0).abs() < tolerance,
            "peak amplitude {} is not near unity",
            h[peak]
        );
        let far = h
            .iter()
            .enumerate()
            .filter(|(i, _)| i.abs_diff(index) > 20)
            .map(|(_, x)| x.abs())
            .fold(0.0, f64::max);
        assert!(far < 0.1 * h[peak].abs(), "residual {far} too large");
    }

    #[test]
    fn inverse_filter_identity() {
        let sweep = reference();
        let deconvolver =
            Deconvolver::new(DeconvolutionMethod::InverseFilter, &sweep, sweep.len(), Some(48000))
                .unwrap();
        let h = deconvolver.deconvolve(sweep.samples()).unwrap();
        assert_eq!(h.len(), sweep.len() + 1);
        assert_unit_impulse_at(&h, 0, 0.4);
    }

    #[test]
    fn inverse_filter_has_unit_gain_at_quarter_bin() {
        for duration in [0.1, 0.25, 0.3] {
            let sweep = ReferenceSweep::exponential(48000, duration, 20.0, 20000.0).unwrap();
            let deconvolver =
                Deconvolver::new(DeconvolutionMethod::InverseFilter, &sweep, sweep.len(), Some(48000))
                    .unwrap();
            let filter = match &deconvolver.kernel {
                Kernel::InverseFilter(filter) => filter,
                Kernel::Spectrum(_) => panic!("expected an inverse filter kernel"),
            };

            let filtered = fft_convolve(filter, sweep.samples());
            let m = filtered.len();
            assert_eq!(m, 2 * sweep.len() - 1);
            let mut spectrum = to_complex(&filtered, m);
            FftPlanner::<f64>::new()
                .plan_fft_forward(m)
                .process(&mut spectrum);
            let bin = (m as f64 / 4.0).round() as usize;
            let gain = spectrum[bin].norm();
            assert!((gain - 1.0).abs() < 1e-8, "{duration} s sweep: gain {gain}");
        }
    }

    #[test]
    fn fft_identity() {
        let sweep = reference();
        let deconvolver =
            Deconvolver::new(DeconvolutionMethod::Fft, &sweep, sweep.len(), None).unwrap();
        let h = deconvolver.deconvolve(sweep.samples()).unwrap();
        assert_eq!(h.len(), sweep.len() + 1);
        assert_unit_impulse_at(&h, 0, 1e-6);
    }

    #[test]
    fn delay_and_gain_are_recovered() {
        let sweep = reference();
        let delay = 300;
        let mut recording = vec![0.0; delay];
        recording.extend(sweep.samples().iter().map(|x| 0.5 * x));
        recording.extend(vec![0.0; 1000]);

        for method in [DeconvolutionMethod::InverseFilter, DeconvolutionMethod::Fft] {
            let deconvolver =
                Deconvolver::new(method, &sweep, recording.len(), Some(48000)).unwrap();
            let h = deconvolver.deconvolve(&recording).unwrap();
            assert_eq!(argmax_abs(&h), delay, "{method}");
            assert!(h[delay] > 0.3 && h[delay] < 0.6, "{method}: {}", h[delay]);
        }
    }

    #[test]
    fn missing_sampling_rate_is_a_configuration_error() {
        let sweep = reference();
        let res = Deconvolver::new(DeconvolutionMethod::InverseFilter, &sweep, sweep.len(), None);
        assert!(matches!(res, Err(ImpulciferError::Configuration(_))));
    }

    #[test]
    fn method_names() {
        assert_eq!(
            "inverse_filter".parse::<DeconvolutionMethod>().unwrap(),
            DeconvolutionMethod::InverseFilter
        );
        assert_eq!(
            "FFT".parse::<DeconvolutionMethod>().unwrap(),
            DeconvolutionMethod::Fft
        );
        assert!(matches!(
            "time".parse::<DeconvolutionMethod>(),
            Err(ImpulciferError::Configuration(_))
        ));
    }

    #[test]
    fn stage_keeps_silent_tracks_silent() {
        let sweep = reference();
        let set = TrackSet::new(
            48000,
            vec![
                Track::new(Speaker::FL.at(Ear::Left), sweep.samples().to_vec()),
                Track::silent(Speaker::FR.at(Ear::Left), sweep.len()),
            ],
        );
        let stage = DeconvolutionStage::new(DeconvolutionMethod::Fft, sweep.clone());
        let out = stage.convert(set).unwrap();
        assert_eq!(out.n_tracks(), 2);
        assert!(!out.tracks()[0].is_silent());
        assert!(out.tracks()[1].is_silent());
        assert_eq!(out.tracks()[1].len(), sweep.len() + 1);
        assert_eq!(out.tracks()[0].len(), sweep.len() + 1);
    }
}
