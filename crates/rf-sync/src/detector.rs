//! Offset detection pipeline
//!
//! Decode both sources, run the chromagram and waveform correlators, pick
//! one estimate.

use crate::buffer::SampleBuffer;
use crate::chroma::ChromaCorrelator;
use crate::config::SyncConfig;
use crate::correlation::CorrelationResult;
use crate::decoder::AudioDecoder;
use crate::selector::{SyncMethod, SyncResult, select};
use crate::waveform::WaveformCorrelator;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything one detection produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Estimate handed to the merge step
    pub result: SyncResult,

    /// Raw waveform estimate
    pub waveform: CorrelationResult,

    /// Pitch-content estimate
    pub chroma: CorrelationResult,

    /// Analyzed length of the scratch audio (seconds)
    pub scratch_seconds: f64,

    /// Analyzed length of the mastered audio (seconds)
    pub mastered_seconds: f64,
}

impl SyncReport {
    /// Estimate the chosen method produced
    pub fn chosen(&self) -> &CorrelationResult {
        match self.result.method {
            SyncMethod::Waveform => &self.waveform,
            SyncMethod::Chromagram => &self.chroma,
        }
    }

    /// True below `threshold` or when the chosen estimate is degenerate
    pub fn is_low_confidence(&self, threshold: f64) -> bool {
        self.result.is_low_confidence(threshold) || self.chosen().degenerate
    }
}

/// Offset detector
pub struct OffsetDetector {
    config: SyncConfig,
    decoder: Box<dyn AudioDecoder>,
}

impl OffsetDetector {
    /// Create with an explicit decoder
    pub fn new(config: SyncConfig, decoder: Box<dyn AudioDecoder>) -> Self {
        Self { config, decoder }
    }

    /// Create with the decoder named in `config`
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let decoder = config.decoder.create()?;
        Ok(Self::new(config, decoder))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn decoder_name(&self) -> &'static str {
        self.decoder.name()
    }

    /// Offset of the mastered `audio` relative to the audio track of `video`
    pub fn detect(&self, video: impl AsRef<Path>, audio: impl AsRef<Path>) -> Result<SyncReport> {
        self.config.validate()?;
        let video = video.as_ref();
        let audio = audio.as_ref();
        let sr = self.config.analysis_sample_rate;
        let duration = self.config.analyze_duration;

        log::info!("Loading audio from video...");
        log::info!("Loading mastered audio...");
        log::debug!("Decoder: {}", self.decoder.name());

        let (scratch, mastered) = if self.config.parallel {
            rayon::join(
                || self.decoder.decode(video, sr, duration),
                || self.decoder.decode(audio, sr, duration),
            )
        } else {
            (
                self.decoder.decode(video, sr, duration),
                self.decoder.decode(audio, sr, duration),
            )
        };

        self.detect_buffers(&scratch?, &mastered?)
    }

    /// Same as [`detect`](Self::detect) on buffers already in memory
    pub fn detect_buffers(
        &self,
        scratch: &SampleBuffer,
        mastered: &SampleBuffer,
    ) -> Result<SyncReport> {
        log::info!(
            "Analyzing {:.1}s of audio",
            scratch.duration_secs().min(mastered.duration_secs())
        );

        let chroma_correlator = ChromaCorrelator::new(&self.config);
        let waveform_correlator = WaveformCorrelator::new(&self.config);

        let (chroma, waveform) = if self.config.parallel {
            rayon::join(
                || chroma_correlator.correlate(scratch, mastered),
                || waveform_correlator.correlate(scratch, mastered),
            )
        } else {
            (
                chroma_correlator.correlate(scratch, mastered),
                waveform_correlator.correlate(scratch, mastered),
            )
        };
        let (chroma, waveform) = (chroma?, waveform?);

        log::info!(
            "Chromagram: {:.3}s (confidence: {:.1}x)",
            chroma.offset_seconds,
            chroma.confidence
        );
        log::info!(
            "Waveform:   {:.3}s (confidence: {:.1}x)",
            waveform.offset_seconds,
            waveform.confidence
        );

        let result = select(&waveform, &chroma, self.config.waveform_preference_margin);
        match result.method {
            SyncMethod::Waveform => log::info!("Using waveform correlation (higher precision)"),
            SyncMethod::Chromagram => log::info!("Using chromagram correlation (more robust)"),
        }

        Ok(SyncReport {
            result,
            waveform,
            chroma,
            scratch_seconds: scratch.duration_secs(),
            mastered_seconds: mastered.duration_secs(),
        })
    }
}
