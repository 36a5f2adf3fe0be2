// Commandline argument parser using clap for Impulcifer

use crate::channel::parse_speaker_list;
use crate::config::PipelineConfig;
use crate::deconvolve::DeconvolutionMethod;
use crate::error::{ImpulciferError, Result};

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
#[allow(missing_docs)]
pub struct ImpulciferArgs {
    #[command(subcommand, long_about)]
    /// Which task to perform, processing recordings or generating a sweep
    pub command: CommandTask,
}

#[derive(Debug, Subcommand, Clone)]
#[allow(missing_docs)]
pub enum CommandTask {
    /// Turn a sine sweep recording into HRIR files
    #[command(about)]
    Process(ProcessCommand),

    /// Write an exponential sine sweep to use as the test signal
    #[command(about)]
    Sweep(SweepCommand),
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
#[allow(missing_docs)]
pub struct ProcessCommand {
    /// Directory for recordings and outputs. recording.wav, test.wav and
    /// headphones.wav are picked up from here unless given explicitly
    #[arg(short = 'd', long = "dir-path")]
    pub dir_path: Option<PathBuf>,

    /// Multichannel sine sweep recording
    #[arg(short = 'r', long = "recording")]
    pub recording: Option<PathBuf>,

    /// The sine sweep that was played, as a WAV file
    #[arg(short = 't', long = "test-signal")]
    pub test_signal: Option<PathBuf>,

    /// Stereo sine sweep recording of the headphones
    #[arg(long = "headphones")]
    pub headphones: Option<PathBuf>,

    /// RON configuration file. Flags given on the command line override it
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Order of speakers in the recording as a comma separated list, for
    /// example "FL,FR". Supported names are FL, FR, FC, BL, BR, SL and SR
    #[arg(short = 's', long = "speakers")]
    pub speakers: Option<String>,

    /// Length of silence in seconds in the beginning, end and between
    /// recordings
    #[arg(long = "silence-length")]
    pub silence_length: Option<f64>,

    /// Equalize the headphones with the headphone recording
    #[arg(long = "compensate-headphones")]
    pub compensate_headphones: bool,

    /// Deconvolution method, inverse_filter or fft
    #[arg(short = 'm', long = "method")]
    pub method: Option<DeconvolutionMethod>,

    /// RMS window for the decay analysis, in milliseconds
    #[arg(long = "rms-window-ms")]
    pub rms_window_ms: Option<f64>,

    /// Peak level of the outputs, in dBFS
    #[arg(long = "target-level-db", allow_hyphen_values = true)]
    pub target_level_db: Option<f64>,
}

/// Files a process run reads and the directory it writes to.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessPaths {
    /// Speaker recording
    pub recording: PathBuf,
    /// Reference sweep
    pub test_signal: PathBuf,
    /// Headphone recording, if any
    pub headphones: Option<PathBuf>,
    /// Where the outputs go
    pub out_dir: PathBuf,
}

impl ProcessCommand {
    /// The configuration for this run: the `--config` file, or the defaults,
    /// with the command line flags applied on top.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_path(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(speakers) = &self.speakers {
            config.speakers = parse_speaker_list(speakers)?;
        }
        if let Some(silence_length) = self.silence_length {
            config.silence_length = silence_length;
        }
        if self.compensate_headphones {
            config.compensate_headphones = true;
        }
        if let Some(method) = self.method {
            config.method = method;
        }
        if let Some(rms_window_ms) = self.rms_window_ms {
            config.rms_window_ms = rms_window_ms;
        }
        if let Some(target_level_db) = self.target_level_db {
            config.target_level_db = target_level_db;
        }
        Ok(config)
    }

    /// Resolves the input files, looking into `--dir-path` for the ones not
    /// given. Outputs go to `--dir-path`, or `out` without one.
    pub fn paths(&self) -> Result<ProcessPaths> {
        let dir = self.dir_path.as_deref().filter(|d| d.is_dir());
        let find = |given: &Option<PathBuf>, name: &str| -> Option<PathBuf> {
            given
                .clone()
                .or_else(|| dir.map(|d| d.join(name)).filter(|p| p.is_file()))
        };
        let missing = |what: &str, name: &str| {
            ImpulciferError::Configuration(format!(
                "no {what} given and no {name} in the directory"
            ))
        };

        Ok(ProcessPaths {
            recording: find(&self.recording, "recording.wav")
                .ok_or_else(|| missing("recording", "recording.wav"))?,
            test_signal: find(&self.test_signal, "test.wav")
                .ok_or_else(|| missing("test signal", "test.wav"))?,
            headphones: find(&self.headphones, "headphones.wav"),
            out_dir: dir.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("out")),
        })
    }
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
#[allow(missing_docs)]
pub struct SweepCommand {
    /// Filename for the sweep to be written to
    #[arg(short = 'o', long = "out")]
    pub outfile: PathBuf,

    /// Sample rate of the sweep, in Hz
    #[arg(short = 's', long = "samp", default_value_t = 48000)]
    pub samp_rate: u32,

    /// Length of the sweep, in seconds
    #[arg(long = "duration", default_value_t = 5.0)]
    pub duration: f64,

    /// Start frequency, in Hz
    #[arg(long = "low", default_value_t = 20.0)]
    pub low: f64,

    /// End frequency, in Hz
    #[arg(long = "high", default_value_t = 20000.0)]
    pub high: f64,
}
