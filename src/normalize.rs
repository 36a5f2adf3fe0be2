//! Peak normalization of a whole track set.

use crate::error::Result;
use crate::signal::TrackSet;
use crate::stage::Stage;

use log::{debug, warn};
use std::fmt;

/// Scales every track of a set by the same gain, so that the largest
/// absolute sample of the set lands at `target_db` dBFS.
#[derive(Debug, Clone)]
pub struct Normalizer {
    target_db: f64,
}

impl Normalizer {
    /// Normalizes to `target_db` dBFS.
    pub fn new(target_db: f64) -> Self {
        Self { target_db }
    }

    /// Linear gain that brings `peak` to the target level.
    pub fn gain(&self, peak: f64) -> f64 {
        10f64.powf(self.target_db / 20.0) / peak
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(-0.1)
    }
}

impl Stage for Normalizer {
    type InData = TrackSet;
    type OutData = TrackSet;

    fn convert(&self, input: TrackSet) -> Result<TrackSet> {
        let peak = input.peak();
        if peak == 0.0 {
            warn!("all tracks are silent, skipping normalization");
            return Ok(input);
        }
        let gain = self.gain(peak);
        debug!("peak {:.6}, gain {:.6}", peak, gain);
        Ok(input.map_samples(|_, samples| samples.into_iter().map(|x| x * gain).collect()))
    }
}

impl fmt::Display for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Normalizer ({} dB)", self.target_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Ear, Speaker};
    use crate::signal::Track;

    fn set() -> TrackSet {
        TrackSet::new(
            44100,
            vec![
                Track::new(Speaker::FL.at(Ear::Left), vec![0.1, -0.25, 0.05]),
                Track::new(Speaker::FL.at(Ear::Right), vec![0.2, 0.0]),
            ],
        )
    }

    #[test]
    fn negative_peak_sets_the_level() {
        let out = Normalizer::new(0.0).convert(set()).unwrap();
        assert!((out.peak() - 1.0).abs() < 1e-12);
        assert!((out.tracks()[0].samples[1] + 1.0).abs() < 1e-12);
        assert!((out.tracks()[1].samples[0] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        let normalizer = Normalizer::default();
        let once = normalizer.convert(set()).unwrap();
        let twice = normalizer.convert(once.clone()).unwrap();
        assert!((once.peak() - 10f64.powf(-0.1 / 20.0)).abs() < 1e-12);
        for (a, b) in once.tracks().iter().zip(twice.tracks()) {
            assert_eq!(a.label, b.label);
            for (x, y) in a.samples.iter().zip(&b.samples) {
                assert!((x - y).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn silence_is_left_alone() {
        let silent = TrackSet::new(
            48000,
            vec![Track::silent(Speaker::FC.at(Ear::Left), 10)],
        );
        assert_eq!(Normalizer::default().convert(silent.clone()).unwrap(), silent);
    }
}
