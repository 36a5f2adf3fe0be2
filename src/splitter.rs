//! Splits a sine sweep recording into individual speaker-ear tracks.
//!
//! A recording looks something like this (stereo only in this example):
//!
//! ```text
//! --/\/\/\----/\/\/\--
//! ---/\/\/\--/\/\/\---
//! ```
//!
//! There are two tracks, one for each ear. Dashes are silence and saw teeth
//! the recorded sweep. The first sweeps of both tracks were played on the
//! first declared speaker, the second ones on the second speaker.
//!
//! There can be any even number of tracks; every pair of tracks is one more
//! pass over the speakers. Speakers are read from left to right and then top
//! to bottom, so with four tracks and speakers `FL,FR,SL,SR` the first
//! track pair holds `FL` and `FR`, the second `SL` and `SR`.

use crate::channel::{ChannelOrder, Ear, Speaker};
use crate::error::{ImpulciferError, Result};
use crate::signal::{MultichannelSignal, Track, TrackSet};
use crate::stage::Stage;

use log::debug;
use std::fmt;

/// Cuts a raw recording into labeled sweep tracks.
#[derive(Debug, Clone)]
pub struct Splitter {
    speakers: Vec<Speaker>,
    sweep_len: usize,
    silence_length: f64,
}

impl Splitter {
    /// `sweep_len` is the reference sweep length in samples, `silence_length`
    /// the silence in seconds at the beginning, end and between the sweeps.
    pub fn new(speakers: Vec<Speaker>, sweep_len: usize, silence_length: f64) -> Self {
        Self {
            speakers,
            sweep_len,
            silence_length,
        }
    }

    /// Silence length in whole samples at the given rate.
    fn silence_samples(&self, sample_rate: u32) -> Result<usize> {
        let samples = self.silence_length * sample_rate as f64;
        if samples < 0.0 || (samples - samples.round()).abs() > 1e-9 {
            return Err(ImpulciferError::Configuration(format!(
                "silence length {} s does not produce full samples at {} Hz",
                self.silence_length, sample_rate
            )));
        }
        Ok(samples.round() as usize)
    }

    fn check_speakers(&self, n_tracks: usize) -> Result<usize> {
        if n_tracks == 0 || n_tracks % 2 != 0 {
            return Err(ImpulciferError::Configuration(format!(
                "recording must have an even number of tracks, got {n_tracks}"
            )));
        }
        if self.speakers.is_empty() {
            return Err(ImpulciferError::Configuration(
                "no speakers declared".to_string(),
            ));
        }
        for (i, speaker) in self.speakers.iter().enumerate() {
            if self.speakers[..i].contains(speaker) {
                return Err(ImpulciferError::Configuration(format!(
                    "speaker {speaker} declared more than once"
                )));
            }
        }
        let pairs = n_tracks / 2;
        if self.speakers.len() % pairs != 0 {
            return Err(ImpulciferError::Configuration(format!(
                "{} speakers can not be spread over {} track pairs",
                self.speakers.len(),
                pairs
            )));
        }
        Ok(self.speakers.len() / pairs)
    }
}

impl Stage for Splitter {
    type InData = MultichannelSignal;
    type OutData = TrackSet;

    fn convert(&self, recording: MultichannelSignal) -> Result<TrackSet> {
        let sample_rate = recording.sample_rate();
        let silence = self.silence_samples(sample_rate)?;
        let n_columns = self.check_speakers(recording.n_tracks())?;
        let column_size = silence + self.sweep_len;
        debug!(
            "splitting {} tracks into {} columns of {} samples",
            recording.n_tracks(),
            n_columns,
            column_size
        );

        // crop out initial silence, then cut every row into columns
        let column = |row: &[f64], c: usize| -> Vec<f64> {
            let start = (silence + c * column_size).min(row.len());
            let end = (start + column_size).min(row.len());
            let mut out = row[start..end].to_vec();
            out.resize(column_size, 0.0);
            out
        };

        let rows = recording.tracks();
        let mut tracks = Vec::with_capacity(self.speakers.len() * 2);
        for (pair, ears) in rows.chunks(2).enumerate() {
            for c in 0..n_columns {
                let speaker = self.speakers[pair * n_columns + c];
                tracks.push(Track::new(speaker.at(Ear::Left), column(&ears[0], c)));
                tracks.push(Track::new(speaker.at(Ear::Right), column(&ears[1], c)));
            }
        }
        Ok(TrackSet::new(sample_rate, tracks))
    }
}

impl fmt::Display for Splitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Splitter")
    }
}

/// Lays a set of tracks out in a fixed channel order, filling in silence
/// for every label the set does not have.
#[derive(Debug, Clone)]
pub struct Reorderer {
    order: ChannelOrder,
}

impl Reorderer {
    #[allow(missing_docs)]
    pub fn new(order: ChannelOrder) -> Self {
        Self { order }
    }
}

impl Stage for Reorderer {
    type InData = TrackSet;
    type OutData = TrackSet;

    fn convert(&self, input: TrackSet) -> Result<TrackSet> {
        if let Some(stray) = input
            .tracks()
            .iter()
            .find(|t| self.order.position(t.label).is_none())
        {
            return Err(ImpulciferError::UnsupportedChannel(format!(
                "{} is not part of the channel order",
                stray.label
            )));
        }

        let len = input.max_len();
        let sample_rate = input.sample_rate();
        let mut tracks = input.into_tracks();
        let reordered = self
            .order
            .labels()
            .iter()
            .map(|&label| match tracks.iter().position(|t| t.label == label) {
                Some(i) => tracks.swap_remove(i),
                None => Track::silent(label, len),
            })
            .collect();
        Ok(TrackSet::new(sample_rate, reordered))
    }
}

impl fmt::Display for Reorderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reorderer")
    }
}
