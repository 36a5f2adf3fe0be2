//! In-memory signal containers.
//!
//! - [MultichannelSignal]: unlabeled, equal-length tracks as they come out
//!   of a WAV file.
//! - [Track]: one mono signal tagged with the [ChannelLabel] it belongs to.
//!   Sweeps and impulse responses are both tracks.
//! - [TrackSet]: an ordered set of labeled tracks at one sampling rate,
//!   handed from stage to stage.

use crate::channel::{ChannelLabel, ChannelOrder, Ear, Speaker};
use crate::error::{ImpulciferError, Result};

/// Equal-length mono tracks at one sampling rate.
#[derive(Debug, Clone, PartialEq)]
pub struct MultichannelSignal {
    sample_rate: u32,
    tracks: Vec<Vec<f64>>,
}

impl MultichannelSignal {
    /// Make a [MultichannelSignalBuilder], which can be used to set the
    /// sampling rate and add tracks before building the signal.
    pub fn builder() -> MultichannelSignalBuilder {
        MultichannelSignalBuilder::new()
    }

    /// Sampling rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The tracks, in file order.
    pub fn tracks(&self) -> &[Vec<f64>] {
        &self.tracks
    }

    /// Number of tracks.
    pub fn n_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Length of every track in samples.
    pub fn len(&self) -> usize {
        self.tracks.first().map_or(0, Vec::len)
    }

    /// True when there are no samples at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the signal, returning the raw tracks.
    pub fn into_tracks(self) -> Vec<Vec<f64>> {
        self.tracks
    }
}

/// Collects tracks for a [MultichannelSignal].
#[derive(Debug, Clone)]
pub struct MultichannelSignalBuilder {
    sample_rate: u32,
    tracks: Vec<Vec<f64>>,
}

impl Default for MultichannelSignalBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MultichannelSignalBuilder {
    /// Instantiate a builder with no tracks and a default sampling rate of
    /// 48000 Hz.
    fn new() -> Self {
        MultichannelSignalBuilder {
            sample_rate: 48000,
            tracks: Vec::new(),
        }
    }

    /// Sets the sampling rate of the builder to the argument.
    pub fn set_samplerate(self, sample_rate: u32) -> Self {
        MultichannelSignalBuilder {
            sample_rate,
            ..self
        }
    }

    /// Adds a track to the builder.
    pub fn add_track(mut self, track: &[f64]) -> Self {
        self.tracks.push(track.to_vec());
        self
    }

    /// Adds an owned track to the builder without copying it.
    pub fn push_track(mut self, track: Vec<f64>) -> Self {
        self.tracks.push(track);
        self
    }

    /// Builds the signal, returning [ImpulciferError::Configuration] if the
    /// tracks are of unequal lengths or the sampling rate is zero.
    pub fn build(self) -> Result<MultichannelSignal> {
        if self.sample_rate == 0 {
            return Err(ImpulciferError::Configuration(
                "sampling rate must be positive".to_string(),
            ));
        }
        let lens: Vec<usize> = self.tracks.iter().map(Vec::len).collect();
        if !lens.windows(2).all(|w| w[0] == w[1]) {
            return Err(ImpulciferError::Configuration(format!(
                "unequal track lengths {lens:?}"
            )));
        }
        Ok(MultichannelSignal {
            sample_rate: self.sample_rate,
            tracks: self.tracks,
        })
    }
}

/// One mono signal and the speaker/ear it was recorded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Speaker and ear of this track
    pub label: ChannelLabel,
    /// The samples
    pub samples: Vec<f64>,
}

impl Track {
    #[allow(missing_docs)]
    pub fn new(label: ChannelLabel, samples: Vec<f64>) -> Self {
        Self { label, samples }
    }

    /// An all-zero track, used for speakers that were not measured.
    pub fn silent(label: ChannelLabel, len: usize) -> Self {
        Self::new(label, vec![0.0; len])
    }

    /// True when every sample is exactly zero.
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&x| x == 0.0)
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f64 {
        self.samples.iter().fold(0.0, |m, x| x.abs().max(m))
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Labeled tracks sharing a sampling rate.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSet {
    sample_rate: u32,
    tracks: Vec<Track>,
}

impl TrackSet {
    #[allow(missing_docs)]
    pub fn new(sample_rate: u32, tracks: Vec<Track>) -> Self {
        Self {
            sample_rate,
            tracks,
        }
    }

    /// Sampling rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The tracks in order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Consumes the set, returning the tracks.
    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }

    /// Number of tracks.
    pub fn n_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Length of the longest track.
    pub fn max_len(&self) -> usize {
        self.tracks.iter().map(Track::len).max().unwrap_or(0)
    }

    /// The track with the given label, if any.
    pub fn get(&self, label: ChannelLabel) -> Option<&Track> {
        self.tracks.iter().find(|t| t.label == label)
    }

    /// The track for a speaker as heard by an ear.
    pub fn track(&self, speaker: Speaker, ear: Ear) -> Option<&Track> {
        self.get(speaker.at(ear))
    }

    /// True when every track is silent.
    pub fn is_silent(&self) -> bool {
        self.tracks.iter().all(Track::is_silent)
    }

    /// Largest absolute sample value across all tracks.
    pub fn peak(&self) -> f64 {
        self.tracks.iter().map(Track::peak).fold(0.0, f64::max)
    }

    /// Labels of the tracks, in set order.
    pub fn order(&self) -> ChannelOrder {
        ChannelOrder::new(self.tracks.iter().map(|t| t.label).collect())
    }

    /// Applies `f` to every track's samples, keeping labels and rate.
    pub fn map_samples<F>(self, mut f: F) -> Self
    where
        F: FnMut(ChannelLabel, Vec<f64>) -> Vec<f64>,
    {
        let sample_rate = self.sample_rate;
        let tracks = self
            .tracks
            .into_iter()
            .map(|t| Track::new(t.label, f(t.label, t.samples)))
            .collect();
        Self::new(sample_rate, tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_equal_lengths() {
        let signal = MultichannelSignal::builder()
            .set_samplerate(44100)
            .add_track(&[0.0; 4])
            .add_track(&[1.0; 4])
            .build()
            .unwrap();
        assert_eq!(signal.sample_rate(), 44100);
        assert_eq!(signal.n_tracks(), 2);
        assert_eq!(signal.len(), 4);
    }

    #[test]
    fn build_unequal_lengths_fails() {
        let res = MultichannelSignal::builder()
            .add_track(&[0.0; 4])
            .add_track(&[0.0; 3])
            .build();
        assert!(matches!(res, Err(ImpulciferError::Configuration(_))));
    }

    #[test]
    fn build_from_empty() {
        let signal = MultichannelSignal::builder().build().unwrap();
        assert!(signal.is_empty());
        assert_eq!(signal.n_tracks(), 0);
    }

    #[test]
    fn silence_and_peak() {
        let silent = Track::silent(Speaker::FL.at(Ear::Left), 8);
        assert!(silent.is_silent());
        let loud = Track::new(Speaker::FL.at(Ear::Right), vec![0.1, -0.7, 0.3]);
        assert!(!loud.is_silent());
        assert_eq!(loud.peak(), 0.7);

        let set = TrackSet::new(48000, vec![silent, loud]);
        assert_eq!(set.peak(), 0.7);
        assert_eq!(set.max_len(), 8);
        assert!(set.track(Speaker::FL, Ear::Right).is_some());
        assert!(set.track(Speaker::FR, Ear::Right).is_none());
    }

    #[test]
    fn order_follows_the_set() {
        let set = TrackSet::new(
            48000,
            vec![
                Track::silent(Speaker::SR.at(Ear::Right), 4),
                Track::silent(Speaker::FL.at(Ear::Left), 4),
                Track::silent(Speaker::SR.at(Ear::Left), 4),
            ],
        );
        let order = set.order();
        assert_eq!(order.len(), 3);
        assert_eq!(order.position(Speaker::FL.at(Ear::Left)), Some(1));
        assert_eq!(order.speakers(), vec![Speaker::SR, Speaker::FL]);
    }
}
