//! Frequency responses in dB on a logarithmic frequency axis, and the
//! transformations the headphone compensator composes to turn a measured
//! response into an equalization filter. Every transformation returns a new
//! response and leaves its input untouched.

use crate::error::{ImpulciferError, Result};

use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

/// Lowest frequency of the standard grid in Hz.
pub const GRID_MIN: f64 = 20.0;

/// Highest frequency of the standard grid in Hz.
pub const GRID_MAX: f64 = 20000.0;

/// Ratio between consecutive frequencies of the standard grid.
pub const GRID_STEP: f64 = 1.01;

/// Frequency the centering pins to 0 dB.
const CENTER_FREQUENCY: f64 = 1000.0;

/// Smoothing window width in octaves below the treble band.
const SMOOTHING_OCTAVES: f64 = 1.0 / 5.0;

/// Smoothing window width in octaves in the treble band.
const TREBLE_SMOOTHING_OCTAVES: f64 = 1.0 / 2.0;

/// Center of the crossover between the two smoothing widths in Hz. The
/// crossover spans one octave.
const TREBLE_SMOOTHING_CROSSOVER: f64 = 6000.0;

/// The standard logarithmic grid: 20 Hz to 20 kHz in steps of 1 %.
pub fn standard_grid() -> Vec<f64> {
    let mut grid = vec![GRID_MIN];
    loop {
        let next = grid[grid.len() - 1] * GRID_STEP;
        if next > GRID_MAX {
            break;
        }
        grid.push(next);
    }
    grid
}

/// Linear interpolation of `values` over `log(frequency)`, holding the end
/// values outside the covered range.
fn interpolate_log(frequency: &[f64], values: &[f64], f: f64) -> f64 {
    let last = frequency.len() - 1;
    if f <= frequency[0] {
        return values[0];
    }
    if f >= frequency[last] {
        return values[last];
    }
    let upper = frequency.partition_point(|&x| x < f);
    let lower = upper - 1;
    let t = (f.ln() - frequency[lower].ln()) / (frequency[upper].ln() - frequency[lower].ln());
    values[lower] + t * (values[upper] - values[lower])
}

/// A magnitude response: levels in dB at strictly increasing, positive
/// frequencies.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyResponse {
    frequency: Vec<f64>,
    raw: Vec<f64>,
}

impl FrequencyResponse {
    /// Fails with [ImpulciferError::Configuration] when the two vectors
    /// differ in length, are empty, or the frequencies are not positive and
    /// strictly increasing.
    pub fn new(frequency: Vec<f64>, raw: Vec<f64>) -> Result<Self> {
        if frequency.len() != raw.len() {
            return Err(ImpulciferError::Configuration(format!(
                "{} frequencies but {} levels",
                frequency.len(),
                raw.len()
            )));
        }
        if frequency.is_empty() {
            return Err(ImpulciferError::Configuration(
                "frequency response is empty".to_string(),
            ));
        }
        if frequency[0] <= 0.0 || frequency.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ImpulciferError::Configuration(
                "frequencies must be positive and strictly increasing".to_string(),
            ));
        }
        Ok(Self { frequency, raw })
    }

    /// An all 0 dB response on the given frequencies.
    pub fn flat(frequency: Vec<f64>) -> Result<Self> {
        let raw = vec![0.0; frequency.len()];
        Self::new(frequency, raw)
    }

    /// Frequencies in Hz.
    pub fn frequency(&self) -> &[f64] {
        &self.frequency
    }

    /// Levels in dB.
    pub fn raw(&self) -> &[f64] {
        &self.raw
    }

    /// Level at any frequency, interpolated on a logarithmic axis.
    pub fn level_at(&self, f: f64) -> f64 {
        interpolate_log(&self.frequency, &self.raw, f)
    }

    fn with_raw(&self, raw: Vec<f64>) -> Self {
        Self {
            frequency: self.frequency.clone(),
            raw,
        }
    }

    /// Resamples onto the [standard_grid].
    pub fn interpolate(&self) -> Self {
        let frequency = standard_grid();
        let raw = frequency.iter().map(|&f| self.level_at(f)).collect();
        Self { frequency, raw }
    }

    /// Shifts the response so that it is at 0 dB at 1 kHz.
    pub fn centered(&self) -> Self {
        self.shifted(-self.level_at(CENTER_FREQUENCY))
    }

    /// Adds `db` to every level.
    pub fn shifted(&self, db: f64) -> Self {
        self.with_raw(self.raw.iter().map(|x| x + db).collect())
    }

    /// The error of this response against a target: `self - target` at
    /// every frequency of this response.
    pub fn compensated(&self, target: &FrequencyResponse) -> Self {
        self.with_raw(
            self.frequency
                .iter()
                .zip(&self.raw)
                .map(|(&f, x)| x - target.level_at(f))
                .collect(),
        )
    }

    /// This response with an equalization applied: `self + eq` at every
    /// frequency of this response.
    pub fn equalized(&self, eq: &FrequencyResponse) -> Self {
        self.with_raw(
            self.frequency
                .iter()
                .zip(&self.raw)
                .map(|(&f, x)| x + eq.level_at(f))
                .collect(),
        )
    }

    /// Fractional octave smoothing: 1/5 octave in the bass and mids, 1/2
    /// octave in the treble, blended over one octave around 6 kHz.
    pub fn smoothed(&self) -> Self {
        let normal = self.octave_average(SMOOTHING_OCTAVES);
        let treble = self.octave_average(TREBLE_SMOOTHING_OCTAVES);
        let raw = self
            .frequency
            .iter()
            .zip(normal.iter().zip(&treble))
            .map(|(&f, (n, t))| {
                let k = ((f / TREBLE_SMOOTHING_CROSSOVER).log2() + 0.5).clamp(0.0, 1.0);
                (1.0 - k) * n + k * t
            })
            .collect();
        self.with_raw(raw)
    }

    /// Average of the levels within `octaves / 2` on either side of each
    /// frequency.
    fn octave_average(&self, octaves: f64) -> Vec<f64> {
        let half = 2f64.powf(octaves / 2.0);
        self.frequency
            .iter()
            .map(|&f| {
                let lo = self.frequency.partition_point(|&x| x < f / half);
                let hi = self.frequency.partition_point(|&x| x <= f * half);
                self.raw[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
            })
            .collect()
    }

    /// The equalization that flattens this response: its inverse, with
    /// boost limited to `max_gain` dB and faded to 0 dB between
    /// `treble_lower` and `treble_upper` Hz.
    pub fn equalization(&self, max_gain: f64, treble_lower: f64, treble_upper: f64) -> Self {
        let raw = self
            .frequency
            .iter()
            .zip(&self.raw)
            .map(|(&f, x)| {
                let gain = (-x).min(max_gain);
                let fade = if f <= treble_lower {
                    1.0
                } else if f >= treble_upper {
                    0.0
                } else {
                    1.0 - (f / treble_lower).ln() / (treble_upper / treble_lower).ln()
                };
                gain * fade
            })
            .collect();
        self.with_raw(raw)
    }

    /// Mean level over `low..=high` Hz.
    pub fn band_mean(&self, low: f64, high: f64) -> Result<f64> {
        let band: Vec<f64> = self
            .frequency
            .iter()
            .zip(&self.raw)
            .filter(|(&f, _)| f >= low && f <= high)
            .map(|(_, &x)| x)
            .collect();
        if band.is_empty() {
            return Err(ImpulciferError::Configuration(format!(
                "no frequencies between {low} and {high} Hz"
            )));
        }
        Ok(band.iter().sum::<f64>() / band.len() as f64)
    }

    /// A minimum phase FIR filter with this magnitude response, designed
    /// on a linear grid of `f_res` Hz up to the Nyquist frequency of
    /// `sample_rate`. The filter is `sample_rate / (2 * f_res)` taps long
    /// and fades out with the falling half of a Hann window.
    pub fn minimum_phase_impulse_response(&self, sample_rate: u32, f_res: f64) -> Result<Vec<f64>> {
        if f_res.is_nan() || f_res <= 0.0 {
            return Err(ImpulciferError::Configuration(format!(
                "filter frequency resolution must be positive, got {f_res}"
            )));
        }
        let half_n = (sample_rate as f64 / 2.0 / f_res).round() as usize;
        if half_n < 2 {
            return Err(ImpulciferError::Configuration(format!(
                "frequency resolution {f_res} Hz is too coarse for {sample_rate} Hz"
            )));
        }
        let n = half_n * 2;

        // log magnitude on the full, mirrored linear grid
        let ln10_20 = 10f64.ln() / 20.0;
        let mut spectrum: Vec<Complex<f64>> = (0..n)
            .map(|k| {
                let bin = if k <= half_n { k } else { n - k };
                Complex::new(self.level_at(bin as f64 * f_res) * ln10_20, 0.0)
            })
            .collect();

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);
        let norm = 1.0 / n as f64;

        // real cepstrum folded onto its causal part
        ifft.process(&mut spectrum);
        for (k, c) in spectrum.iter_mut().enumerate() {
            let fold = match k {
                0 => 1.0,
                k if k < half_n => 2.0,
                k if k == half_n => 1.0,
                _ => 0.0,
            };
            *c = Complex::new(c.re * norm * fold, 0.0);
        }
        fft.process(&mut spectrum);
        for c in spectrum.iter_mut() {
            *c = c.exp();
        }
        ifft.process(&mut spectrum);

        let len = half_n;
        let denom = (2 * len - 1) as f64;
        Ok(spectrum
            .iter()
            .take(len)
            .enumerate()
            .map(|(i, c)| {
                let fade = 0.5 - 0.5 * (2.0 * PI * (i + len) as f64 / denom).cos();
                c.re * norm * fade
            })
            .collect())
    }
}
