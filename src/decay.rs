//! Decay analysis of impulse responses. The energy of a room response
//! decays roughly linearly in dB until it sinks into the noise floor of the
//! measurement; everything after that point is noise and gets cut.

use crate::error::{ImpulciferError, Result};
use crate::signal::TrackSet;
use crate::stage::Stage;

use log::{debug, info, warn};
use rayon::prelude::*;
use std::fmt;

/// Window length of the Savitzky-Golay smoother, in RMS windows.
const SMOOTHING_WINDOW: usize = 11;

/// How many times the smoother is applied.
const SMOOTHING_PASSES: usize = 200;

/// Safety margin above the noise floor, in dB.
const NOISE_FLOOR_MARGIN_DB: f64 = 3.0;

/// RMS level stand-in for windows that are exactly silent.
const SILENT_WINDOW_RMS: f64 = 0.001;

/// Smoothed RMS level of an impulse response in consecutive windows.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayCurve {
    /// Level of each window in dB
    pub values: Vec<f64>,
    /// Number of samples in each window
    pub window_size: usize,
}

impl DecayCurve {
    /// Computes the decay curve of `ir` with windows of `window_size`
    /// samples. The trailing partial window is dropped.
    pub fn new(ir: &[f64], window_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(ImpulciferError::Configuration(
                "RMS window must be at least one sample long".to_string(),
            ));
        }
        let levels: Vec<f64> = ir
            .chunks_exact(window_size)
            .map(|w| {
                let rms = (w.iter().map(|x| x * x).sum::<f64>() / window_size as f64).sqrt();
                let rms = if rms == 0.0 { SILENT_WINDOW_RMS } else { rms };
                20.0 * rms.log10()
            })
            .collect();

        let values = if levels.len() < SMOOTHING_WINDOW {
            levels
        } else {
            (0..SMOOTHING_PASSES).fold(levels, |curve, _| savgol_linear(&curve))
        };
        Ok(Self {
            values,
            window_size,
        })
    }

    /// Number of windows.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index of the loudest window.
    pub fn peak_window(&self) -> Option<usize> {
        self.values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }

    /// The first window after the peak that has decayed into the noise
    /// floor. The floor is the level where the curve first stops falling,
    /// plus a 3 dB margin. Always within `peak ..len()`.
    pub fn tail_window(&self) -> Option<usize> {
        let peak = self.peak_window()?;
        let v = &self.values;

        let mut floor_window = v.len() - 1;
        for i in peak + 1..v.len() {
            if v[i] > v[i - 1] {
                floor_window = i - 1;
                break;
            }
        }
        let noise_floor = v[floor_window] + NOISE_FLOOR_MARGIN_DB;

        // floor_window itself is below the floor, so this always finds one
        (peak..v.len()).find(|&i| v[i] < noise_floor)
    }

    /// Sample index after which the response is only noise.
    pub fn tail_index(&self) -> Option<usize> {
        self.tail_window().map(|w| w * self.window_size)
    }
}

/// One pass of a Savitzky-Golay filter with polynomial order one. Inside
/// the signal this is a centered moving average; the edges are taken from
/// a least squares line through the first and last window of points.
/// `x` must hold at least [SMOOTHING_WINDOW] points.
fn savgol_linear(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    let half = SMOOTHING_WINDOW / 2;
    let mut out = vec![0.0; n];

    let mut sum: f64 = x[..SMOOTHING_WINDOW].iter().sum();
    out[half] = sum / SMOOTHING_WINDOW as f64;
    for i in half + 1..n - half {
        sum += x[i + half] - x[i - half - 1];
        out[i] = sum / SMOOTHING_WINDOW as f64;
    }

    let head = fit_line(&x[..SMOOTHING_WINDOW]);
    for (i, y) in out.iter_mut().enumerate().take(half) {
        *y = head(i as f64);
    }
    let tail = fit_line(&x[n - SMOOTHING_WINDOW..]);
    for i in n - half..n {
        out[i] = tail((i + SMOOTHING_WINDOW - n) as f64);
    }
    out
}

/// Least squares line through `(i, y[i])`, returned as a function of `i`.
fn fit_line(y: &[f64]) -> impl Fn(f64) -> f64 {
    let n = y.len() as f64;
    let mid = (n - 1.0) / 2.0;
    let mean = y.iter().sum::<f64>() / n;
    let (num, den) = y
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, v)| {
            let dx = i as f64 - mid;
            (num + dx * (v - mean), den + dx * dx)
        });
    let slope = if den > 0.0 { num / den } else { 0.0 };
    move |i| mean + slope * (i - mid)
}

/// Cuts every track of a set at the latest point where any of them has
/// decayed into noise, so the set keeps a uniform length.
#[derive(Debug, Clone)]
pub struct TailTruncator {
    window_ms: f64,
}

impl TailTruncator {
    /// `window_ms` is the RMS window length in milliseconds.
    pub fn new(window_ms: f64) -> Self {
        Self { window_ms }
    }

    /// RMS window length in samples at the given rate.
    pub fn window_size(&self, sample_rate: u32) -> usize {
        (sample_rate as f64 * self.window_ms / 1000.0).round() as usize
    }
}

impl Stage for TailTruncator {
    type InData = TrackSet;
    type OutData = TrackSet;

    fn convert(&self, input: TrackSet) -> Result<TrackSet> {
        let window_size = self.window_size(input.sample_rate());

        let tails = input
            .tracks()
            .par_iter()
            .filter(|track| !track.is_silent())
            .map(|track| {
                let curve = DecayCurve::new(&track.samples, window_size)?;
                let tail = curve.tail_index().unwrap_or(track.len());
                debug!("{}: tail at sample {}", track.label, tail);
                Ok(tail)
            })
            .collect::<Result<Vec<usize>>>()?;

        let Some(cutoff) = tails.into_iter().max() else {
            warn!("every track is silent, nothing to truncate");
            return Ok(input);
        };
        info!("cropping tails at {} samples", cutoff);

        Ok(input.map_samples(|_, mut samples| {
            samples.resize(cutoff, 0.0);
            samples
        }))
    }
}

impl fmt::Display for TailTruncator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TailTruncator")
    }
}
