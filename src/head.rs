//! Crops the silent head of each left/right impulse response pair and sets
//! the delay of the first arrival to what the speaker geometry says it
//! should be, while keeping the interaural time difference (ITD) measured
//! between the ears.

use crate::channel::{Ear, Side, Speaker};
use crate::config::SpeakerDelayTable;
use crate::error::{ImpulciferError, Result};
use crate::signal::{Track, TrackSet};
use crate::stage::Stage;

use log::debug;
use std::fmt;

/// Peaks lower than this fraction of the channel maximum are ignored.
const PEAK_HEIGHT: f64 = 0.1;

/// Shape parameter of the Kaiser window used for the fade in.
const FADE_IN_BETA: f64 = 16.0;

/// Indices of the local maxima of `x`. A flat peak resolves to its middle
/// sample (rounding down), and the first and last samples are never peaks.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// The first local maximum whose height is at least a tenth of the
/// channel's maximum.
pub fn first_peak(x: &[f64]) -> Option<usize> {
    let max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max.is_nan() || max <= 0.0 {
        return None;
    }
    local_maxima(x)
        .into_iter()
        .find(|&i| x[i] / max >= PEAK_HEIGHT)
}

/// Zeroth order modified Bessel function of the first kind.
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 1..500 {
        term *= (half / k as f64).powi(2);
        sum += term;
        if term < sum * 1e-17 {
            break;
        }
    }
    sum
}

/// Symmetric Kaiser window of `len` samples.
pub fn kaiser(len: usize, beta: f64) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = bessel_i0(beta);
            let m = (len - 1) as f64;
            (0..len)
                .map(|n| {
                    let r = 2.0 * n as f64 / m - 1.0;
                    bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom
                })
                .collect()
        }
    }
}

/// Drops or prepends samples so that exactly `lead` samples precede `peak`.
fn crop_to_lead(samples: &[f64], peak: usize, lead: usize) -> Vec<f64> {
    if peak >= lead {
        samples[peak - lead..].to_vec()
    } else {
        let mut out = vec![0.0; lead - peak];
        out.extend_from_slice(samples);
        out
    }
}

/// Aligns left/right impulse response pairs speaker by speaker.
#[derive(Debug, Clone)]
pub struct HeadAligner {
    delays: SpeakerDelayTable,
    head_room: usize,
}

impl HeadAligner {
    /// `head_room` is the number of samples faded in before the first
    /// arrival of the nearer ear.
    pub fn new(delays: SpeakerDelayTable, head_room: usize) -> Self {
        Self { delays, head_room }
    }

    /// Crops one pair. Returns the new `(left, right)` samples.
    ///
    /// Fails with [ImpulciferError::MeasurementIntegrity] if the ear that
    /// hears the speaker first is not on the speaker's side, or if either
    /// channel has no qualifying peak.
    pub fn align_pair(
        &self,
        left: &[f64],
        right: &[f64],
        speaker: Speaker,
        sample_rate: u32,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let no_peak = |ear: Ear| {
            ImpulciferError::MeasurementIntegrity(format!(
                "{} impulse response has no clear peak",
                speaker.at(ear)
            ))
        };
        let peak_left = first_peak(left).ok_or_else(|| no_peak(Ear::Left))?;
        let peak_right = first_peak(right).ok_or_else(|| no_peak(Ear::Right))?;

        let itd = peak_left.abs_diff(peak_right);
        let delay = self.delays.delay_samples(speaker, sample_rate)? + self.head_room;
        debug!("{speaker}: peaks at {peak_left} and {peak_right}, ITD {itd}, delay {delay}");

        let (lead_left, lead_right) = if peak_left < peak_right {
            // left ear is nearer, this must be a left side speaker
            if speaker.side() == Side::Right {
                return Err(ImpulciferError::MeasurementIntegrity(format!(
                    "{speaker} impulse response has lower delay to left ear than to right"
                )));
            }
            (delay, delay + itd)
        } else if peak_right < peak_left {
            if speaker.side() == Side::Left {
                return Err(ImpulciferError::MeasurementIntegrity(format!(
                    "{speaker} impulse response has lower delay to right ear than to left"
                )));
            }
            (delay + itd, delay)
        } else {
            (delay, delay)
        };

        let mut left = crop_to_lead(left, peak_left, lead_left);
        let mut right = crop_to_lead(right, peak_right, lead_right);

        // make sure the responses start from silence
        let window = kaiser(self.head_room * 2, FADE_IN_BETA);
        for samples in [&mut left, &mut right] {
            for (x, w) in samples.iter_mut().zip(window.iter().take(self.head_room)) {
                *x *= w;
            }
        }
        Ok((left, right))
    }
}

impl Stage for HeadAligner {
    type InData = TrackSet;
    type OutData = TrackSet;

    /// Aligns every speaker in the set. Pairs where both ears are silent
    /// are passed through; a pair with one silent ear is a
    /// [ImpulciferError::MeasurementIntegrity].
    fn convert(&self, input: TrackSet) -> Result<TrackSet> {
        let sample_rate = input.sample_rate();

        let speakers = input.order().speakers();
        let mut aligned: Vec<(Track, Track)> = Vec::with_capacity(speakers.len());
        for speaker in speakers {
            let (left, right) = match (
                input.track(speaker, Ear::Left),
                input.track(speaker, Ear::Right),
            ) {
                (Some(left), Some(right)) => (left, right),
                _ => {
                    return Err(ImpulciferError::MeasurementIntegrity(format!(
                        "{speaker} does not have both a left and a right ear track"
                    )))
                }
            };
            match (left.is_silent(), right.is_silent()) {
                (true, true) => aligned.push((left.clone(), right.clone())),
                (false, false) => {
                    let (l, r) = self.align_pair(&left.samples, &right.samples, speaker, sample_rate)?;
                    aligned.push((Track::new(left.label, l), Track::new(right.label, r)));
                }
                _ => {
                    return Err(ImpulciferError::MeasurementIntegrity(format!(
                        "left and right ear recordings of {speaker} must be non-zero for both or neither"
                    )))
                }
            }
        }

        // keep the input order
        let mut by_label: Vec<Track> = aligned.into_iter().flat_map(|(l, r)| [l, r]).collect();
        let tracks = input
            .tracks()
            .iter()
            .filter_map(|t| {
                let i = by_label.iter().position(|a| a.label == t.label)?;
                Some(by_label.swap_remove(i))
            })
            .collect();
        Ok(TrackSet::new(sample_rate, tracks))
    }
}

impl fmt::Display for HeadAligner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeadAligner")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A decaying click starting at `at`
    fn click(len: usize, at: usize, gain: f64) -> Vec<f64> {
        let mut x = vec![0.0; len];
        for (i, v) in x.iter_mut().skip(at).take(20).enumerate() {
            *v = gain * 0.5f64.powi(i as i32) * if i % 2 == 0 { 1.0 } else { -1.0 };
        }
        x
    }

    fn argmax(x: &[f64]) -> usize {
        x.iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn local_maxima_with_plateaus() {
        let x = [0.0, 1.0, 0.0, 2.0, 2.0, 2.0, 0.0, 3.0, 3.0, 1.0, 5.0];
        assert_eq!(local_maxima(&x), vec![1, 4, 7]);
    }

    #[test]
    fn first_peak_ignores_small_bumps() {
        let mut x = vec![0.0; 100];
        x[10] = 0.05;
        x[30] = 1.0;
        x[60] = 0.8;
        assert_eq!(first_peak(&x), Some(30));
        assert_eq!(first_peak(&[0.0; 10]), None);
    }

    #[test]
    fn kaiser_is_symmetric_and_peaks_at_one() {
        let w = kaiser(96, 16.0);
        assert_eq!(w.len(), 96);
        for i in 0..48 {
            assert!((w[i] - w[95 - i]).abs() < 1e-12);
        }
        assert!(w[0] < 1e-5);
        assert!((w[47] - 1.0).abs() < 0.01);
        assert!(w.windows(2).take(47).all(|p| p[0] <= p[1]));
    }

    #[test]
    fn left_speaker_keeps_itd() {
        let aligner = HeadAligner::new(SpeakerDelayTable::zero(), 10);
        let itd = 17;
        let left = click(1000, 300, 1.0);
        let right = click(1000, 300 + itd, 0.6);

        let (l, r) = aligner.align_pair(&left, &right, Speaker::FL, 48000).unwrap();
        assert_eq!(argmax(&l), 10);
        assert_eq!(argmax(&r), 10 + itd);
        assert_eq!(argmax(&r) - argmax(&l), itd);
        // the fade in forces a silent start
        assert!(l[0].abs() < 1e-6 && r[0].abs() < 1e-6);
    }

    #[test]
    fn right_speaker_keeps_itd() {
        let delays = SpeakerDelayTable::new([(Speaker::SR, 0.5)]);
        let aligner = HeadAligner::new(delays, 4);
        let itd = 25;
        let left = click(2000, 900 + itd, 0.5);
        let right = click(2000, 900, 1.0);

        let (l, r) = aligner.align_pair(&left, &right, Speaker::SR, 48000).unwrap();
        // 0.5 ms at 48 kHz is 24 samples, plus head room
        assert_eq!(argmax(&r), 28);
        assert_eq!(argmax(&l), 28 + itd);
    }

    #[test]
    fn early_peak_is_front_padded() {
        let aligner = HeadAligner::new(SpeakerDelayTable::zero(), 48);
        let left = click(500, 5, 1.0);
        let right = click(500, 9, 1.0);
        let (l, r) = aligner.align_pair(&left, &right, Speaker::SL, 48000).unwrap();
        assert_eq!(argmax(&l), 48);
        assert_eq!(argmax(&r), 52);
    }

    #[test]
    fn contradicting_geometry_is_an_integrity_error() {
        let aligner = HeadAligner::new(SpeakerDelayTable::zero(), 10);
        let near = click(1000, 300, 1.0);
        let far = click(1000, 320, 1.0);

        let err = aligner
            .align_pair(&near, &far, Speaker::FR, 48000)
            .unwrap_err();
        match err {
            ImpulciferError::MeasurementIntegrity(msg) => assert!(msg.contains("FR")),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(
            aligner.align_pair(&far, &near, Speaker::BL, 48000),
            Err(ImpulciferError::MeasurementIntegrity(_))
        ));
        // the center speaker may reach either ear first
        assert!(aligner.align_pair(&near, &far, Speaker::FC, 48000).is_ok());
        assert!(aligner.align_pair(&far, &near, Speaker::FC, 48000).is_ok());
    }

    #[test]
    fn stage_handles_silent_and_half_silent_pairs() {
        let aligner = HeadAligner::new(SpeakerDelayTable::zero(), 10);
        let set = TrackSet::new(
            48000,
            vec![
                Track::new(Speaker::FL.at(Ear::Left), click(400, 100, 1.0)),
                Track::new(Speaker::FL.at(Ear::Right), click(400, 110, 1.0)),
                Track::silent(Speaker::FR.at(Ear::Left), 400),
                Track::silent(Speaker::FR.at(Ear::Right), 400),
            ],
        );
        let out = aligner.convert(set).unwrap();
        let labels: Vec<String> = out.tracks().iter().map(|t| t.label.to_string()).collect();
        assert_eq!(labels, ["FL-left", "FL-right", "FR-left", "FR-right"]);
        assert_eq!(argmax(&out.tracks()[1].samples), 20);
        assert!(out.tracks()[2].is_silent());

        let half = TrackSet::new(
            48000,
            vec![
                Track::new(Speaker::FL.at(Ear::Left), click(400, 100, 1.0)),
                Track::silent(Speaker::FL.at(Ear::Right), 400),
            ],
        );
        assert!(matches!(
            aligner.convert(half),
            Err(ImpulciferError::MeasurementIntegrity(_))
        ));
    }
}
