//! FFT based helpers shared by the deconvolver and the headphone
//! compensator.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

/// Full linear convolution of `a` and `b`, `a.len() + b.len() - 1` samples
/// long, computed with a zero padded FFT.
pub fn fft_convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let out_len = a.len() + b.len() - 1;
    let n_fft = out_len.next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let ifft = planner.plan_fft_inverse(n_fft);

    let mut a_spec = to_complex(a, n_fft);
    let mut b_spec = to_complex(b, n_fft);
    fft.process(&mut a_spec);
    fft.process(&mut b_spec);

    let mut product: Vec<Complex<f64>> = a_spec
        .iter()
        .zip(b_spec.iter())
        .map(|(x, y)| x * y)
        .collect();
    ifft.process(&mut product);

    let norm = 1.0 / n_fft as f64;
    product.iter().take(out_len).map(|c| c.re * norm).collect()
}

/// Convolves `signal` with a causal `filter` and keeps the first
/// `signal.len()` samples, so the output lines up with the input.
pub fn convolve_causal(signal: &[f64], filter: &[f64]) -> Vec<f64> {
    let mut out = fft_convolve(signal, filter);
    out.resize(signal.len(), 0.0);
    out
}

/// Magnitude of a single DFT bin of `x`, with the DFT taken over exactly
/// `x.len()` points.
pub fn dft_bin_magnitude(x: &[f64], bin: usize) -> f64 {
    let n = x.len();
    let w = -2.0 * PI / n as f64;
    x.iter()
        .enumerate()
        .fold(Complex::new(0.0, 0.0), |acc, (i, &v)| {
            // i * bin can get large, reduce the phase before the trig calls
            let phase = w * ((i * bin) % n) as f64;
            acc + Complex::from_polar(v, phase)
        })
        .norm()
}

/// One-sided magnitude response of `x` in dB. Returns frequencies and
/// magnitudes for bins `0 .. ceil(n / 2)`.
pub fn magnitude_response(x: &[f64], sample_rate: u32) -> (Vec<f64>, Vec<f64>) {
    let n = x.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }
    let mut spectrum = to_complex(x, n);
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(n).process(&mut spectrum);

    let df = sample_rate as f64 / n as f64;
    let half = n.div_ceil(2);
    let frequency = (0..half).map(|k| k as f64 * df).collect();
    let magnitude = spectrum
        .iter()
        .take(half)
        .map(|c| 20.0 * c.norm().max(1e-12).log10())
        .collect();
    (frequency, magnitude)
}

/// Copies a real signal into a zero padded complex buffer of length `n`.
pub fn to_complex(x: &[f64], n: usize) -> Vec<Complex<f64>> {
    let mut buf: Vec<Complex<f64>> = x.iter().take(n).map(|&v| Complex::new(v, 0.0)).collect();
    buf.resize(n, Complex::new(0.0, 0.0));
    buf
}
