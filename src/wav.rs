//! A wrapper for the hound library suited for Impulcifer's toolchain.
//! Integer PCM of any width is scaled into `-1.0..1.0` on the way in, and
//! outputs are written as 32 bit integer PCM.

use crate::error::Result;
use crate::signal::{MultichannelSignal, TrackSet};
use crate::TransposableIter;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;
use std::path::Path;

const OUT_BITS_PER_SAMPLE: u16 = 32;

/// Reads a WAV file into one track per channel.
pub fn read_wav(path: impl AsRef<Path>) -> Result<MultichannelSignal> {
    let mut reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    debug!("reading {:?}: {:?}", path.as_ref(), spec);

    // collect wav file data into Vec of interleaved samples in -1..1
    let interleaved: Vec<f64> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|x| x.map(f64::from))
            .collect::<std::result::Result<_, hound::Error>>()?,
        SampleFormat::Int => {
            let scale = 2.0_f64.powi(spec.bits_per_sample as i32 - 1);
            reader
                .samples::<i32>()
                .map(|x| x.map(|v| v as f64 / scale))
                .collect::<std::result::Result<_, hound::Error>>()?
        }
    };

    let n_channels = spec.channels as usize;
    let mut builder = MultichannelSignal::builder().set_samplerate(spec.sample_rate);
    for i in 0..n_channels {
        let track: Vec<f64> = interleaved
            .iter()
            .skip(i)
            .step_by(n_channels)
            .cloned()
            .collect();
        builder = builder.push_track(track);
    }
    builder.build()
}

/// Writes every track of a set as one channel of a WAV file, in set order.
/// Samples are clipped to `-1.0..=1.0`.
pub fn write_wav(path: impl AsRef<Path>, tracks: &TrackSet) -> Result<()> {
    let channels: Vec<&[f64]> = tracks.tracks().iter().map(|t| t.samples.as_slice()).collect();
    write_channels(path, tracks.sample_rate(), &channels)
}

/// Writes unlabeled channels to a WAV file. Shorter channels are padded
/// with silence to the longest one.
pub fn write_channels(path: impl AsRef<Path>, sample_rate: u32, channels: &[&[f64]]) -> Result<()> {
    let spec = WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: OUT_BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path.as_ref(), spec)?;

    // pad so that every channel has the same number of frames
    let len = channels.iter().map(|c| c.len()).max().unwrap_or(0);
    let padded = channels.iter().map(|c| {
        c.iter()
            .cloned()
            .chain(std::iter::repeat(0.0))
            .take(len)
    });

    // interleave the streams and write the samples to the WAV file
    for frame in padded.transpose() {
        for x in frame {
            writer.write_sample(to_i32(x))?;
        }
    }

    // finalize explicitly so errors surface here rather than on drop
    writer.finalize()?;
    debug!(
        "wrote {} channels of {} samples to {:?}",
        channels.len(),
        len,
        path.as_ref()
    );
    Ok(())
}

fn to_i32(x: f64) -> i32 {
    (x.clamp(-1.0, 1.0) * i32::MAX as f64).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelOrder;
    use crate::signal::Track;

    use std::f64::consts::PI;

    fn create_sine_wave(frames: usize, freq: f64, sample_rate: u32) -> Vec<f64> {
        (0..frames)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f64 / sample_rate as f64).sin())
            .collect()
    }

    // Write a two channel sine wave and read it back
    #[test]
    fn write_and_read_path() {
        let tempfile = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let labels = ChannelOrder::canonical();
        let left = create_sine_wave(100, 440.0, 48000);
        let right = create_sine_wave(100, 880.0, 48000);
        let set = TrackSet::new(
            48000,
            vec![
                Track::new(labels.labels()[0], left.clone()),
                Track::new(labels.labels()[1], right.clone()),
            ],
        );

        write_wav(tempfile.path(), &set).unwrap();
        let signal = read_wav(tempfile.path()).unwrap();

        assert_eq!(signal.sample_rate(), 48000);
        assert_eq!(signal.n_tracks(), 2);
        for (written, read) in [left, right].iter().zip(signal.tracks()) {
            assert_eq!(written.len(), read.len());
            for (a, b) in written.iter().zip(read.iter()) {
                assert!((a - b).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn integer_pcm_is_scaled() {
        let tempfile = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(tempfile.path(), spec).unwrap();
        for v in [i16::MIN, 0, 16384] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let signal = read_wav(tempfile.path()).unwrap();
        assert_eq!(signal.tracks()[0], vec![-1.0, 0.0, 0.5]);
    }

    #[test]
    fn float_pcm_is_kept() {
        let tempfile = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(tempfile.path(), spec).unwrap();
        for v in [0.25f32, -0.25, 0.5, -0.5] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let signal = read_wav(tempfile.path()).unwrap();
        assert_eq!(signal.tracks()[0], vec![0.25, 0.5]);
        assert_eq!(signal.tracks()[1], vec![-0.25, -0.5]);
    }

    #[test]
    fn channels_are_padded() {
        let tempfile = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        write_channels(tempfile.path(), 44100, &[&[0.5, 0.5, 0.5], &[-0.5]]).unwrap();
        let signal = read_wav(tempfile.path()).unwrap();
        assert_eq!(signal.len(), 3);
        assert_eq!(signal.tracks()[1][1..], [0.0, 0.0]);
    }

    #[test]
    fn clipping() {
        assert_eq!(to_i32(2.0), i32::MAX);
        assert_eq!(to_i32(-2.0), -i32::MAX);
        assert_eq!(to_i32(0.0), 0);
    }
}
