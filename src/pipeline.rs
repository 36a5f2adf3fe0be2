//! Runs every step from a raw sweep recording to the exported HRIR sets.

use crate::config::PipelineConfig;
use crate::decay::TailTruncator;
use crate::deconvolve::DeconvolutionStage;
use crate::error::{ImpulciferError, Result};
use crate::export::Exporter;
use crate::head::HeadAligner;
use crate::headphones::HeadphoneCompensator;
use crate::normalize::Normalizer;
use crate::signal::{MultichannelSignal, TrackSet};
use crate::splitter::{Reorderer, Splitter};
use crate::stage::run_stage;
use crate::sweep::ReferenceSweep;

use log::{info, warn};
use std::path::Path;

/// Everything a run produces. The intermediate sets are kept for
/// debugging.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Split, reordered and normalized sweep recordings
    pub preprocessed: TrackSet,
    /// Raw impulse responses, before alignment and truncation
    pub responses: TrackSet,
    /// Final impulse responses in the configured channel order
    pub hrir: TrackSet,
    /// Final impulse responses in HeSuVi channel order
    pub hesuvi: TrackSet,
}

impl PipelineOutput {
    /// Writes `preprocessed.wav`, `responses.wav`, `hrir.wav` and
    /// `hesuvi.wav` into `dir`, creating it if needed.
    pub fn write(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        for (name, set) in [
            ("preprocessed.wav", &self.preprocessed),
            ("responses.wav", &self.responses),
            ("hrir.wav", &self.hrir),
            ("hesuvi.wav", &self.hesuvi),
        ] {
            crate::wav::write_wav(dir.join(name), set)?;
        }
        info!("outputs written to {:?}", dir);
        Ok(())
    }
}

/// The processing pipeline for one configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    #[allow(missing_docs)]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    #[allow(missing_docs)]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Turns a speaker recording into HRIRs. `headphones` is only used when
    /// headphone compensation is enabled, and is required then.
    pub fn process(
        &self,
        recording: MultichannelSignal,
        reference: &ReferenceSweep,
        headphones: Option<MultichannelSignal>,
    ) -> Result<PipelineOutput> {
        let config = &self.config;
        config.validate()?;

        let sample_rate = reference.sample_rate();
        for signal in std::iter::once(&recording).chain(headphones.as_ref()) {
            if signal.sample_rate() != sample_rate {
                return Err(ImpulciferError::SampleRateMismatch {
                    recording: signal.sample_rate(),
                    reference: sample_rate,
                });
            }
        }
        let compensator = match (config.compensate_headphones, headphones) {
            (true, Some(headphones)) => Some(HeadphoneCompensator::new(
                headphones,
                reference.clone(),
                config.silence_length,
            )),
            (true, None) => {
                return Err(ImpulciferError::Configuration(
                    "headphone compensation needs a headphone recording".to_string(),
                ))
            }
            (false, Some(_)) => {
                warn!("headphone recording given but compensation is disabled, ignoring it");
                None
            }
            (false, None) => None,
        };
        info!(
            "processing {} tracks at {} Hz for speakers {:?}",
            recording.n_tracks(),
            sample_rate,
            config.speakers
        );

        let splitter = Splitter::new(
            config.speakers.clone(),
            reference.len(),
            config.silence_length,
        );
        let split = run_stage(&splitter, recording)?;
        let reordered = run_stage(&Reorderer::new(config.channel_order.clone()), split)?;
        let normalizer = Normalizer::new(config.target_level_db);
        let preprocessed = run_stage(&normalizer, reordered)?;

        let deconvolver = DeconvolutionStage::new(config.method, reference.clone());
        let responses = run_stage(&deconvolver, preprocessed.clone())?;

        let aligner = HeadAligner::new(
            config.speaker_delays.clone(),
            config.head_room_samples(sample_rate),
        );
        let aligned = run_stage(&aligner, responses.clone())?;
        let truncated = run_stage(&TailTruncator::new(config.rms_window_ms), aligned)?;
        let mut hrir = run_stage(&normalizer, truncated)?;

        if let Some(compensator) = compensator {
            hrir = run_stage(&compensator, hrir)?;
        }

        let hesuvi = run_stage(&Exporter::new(config.hesuvi_order.clone()), hrir.clone())?;
        let hrir = run_stage(&Exporter::new(config.channel_order.clone()), hrir)?;

        Ok(PipelineOutput {
            preprocessed,
            responses,
            hrir,
            hesuvi,
        })
    }
}
