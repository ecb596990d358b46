//! Configuration for offset detection and merging

use crate::correlation::CorrelationMethod;
use crate::decoder::DecoderKind;
use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for offset detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds of each source used for analysis
    pub analyze_duration: f64,

    /// Sample rate both sources are resampled to (Hz)
    pub analysis_sample_rate: u32,

    /// Samples per pitch-profile frame
    pub chroma_hop_length: usize,

    /// STFT size for the chroma transform (power of 2)
    pub chroma_fft_size: usize,

    /// Lowest pitch of the chroma transform (Hz)
    pub chroma_fmin: f64,

    /// Number of octaves folded into the chroma
    pub chroma_octaves: usize,

    /// Waveform wins when its confidence exceeds chroma confidence times this
    pub waveform_preference_margin: f64,

    /// Results below this confidence are reported as unreliable
    pub low_confidence_threshold: f64,

    /// Cross-correlation evaluation strategy
    pub correlation_method: CorrelationMethod,

    /// Which decoder turns the sources into sample buffers
    pub decoder: DecoderKind,

    /// Run the two decodes and the two correlators concurrently
    pub parallel: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            analyze_duration: 40.0,
            analysis_sample_rate: 22050,
            chroma_hop_length: 512,
            chroma_fft_size: 4096,
            chroma_fmin: 32.703, // C1
            chroma_octaves: 7,
            waveform_preference_margin: 0.8,
            low_confidence_threshold: 3.0,
            correlation_method: CorrelationMethod::Auto,
            decoder: DecoderKind::Auto,
            parallel: true,
        }
    }
}

impl SyncConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.analyze_duration.is_finite() && self.analyze_duration > 0.0) {
            return Err(SyncError::ConfigError(format!(
                "analyze_duration must be positive, got {}",
                self.analyze_duration
            )));
        }
        if self.analysis_sample_rate == 0 {
            return Err(SyncError::ConfigError(
                "analysis_sample_rate must be positive".into(),
            ));
        }
        if self.chroma_hop_length == 0 {
            return Err(SyncError::ConfigError(
                "chroma_hop_length must be positive".into(),
            ));
        }
        if !self.chroma_fft_size.is_power_of_two() {
            return Err(SyncError::ConfigError(format!(
                "chroma_fft_size must be power of 2, got {}",
                self.chroma_fft_size
            )));
        }
        if self.chroma_fmin.is_nan() || self.chroma_fmin <= 0.0 || self.chroma_octaves == 0 {
            return Err(SyncError::ConfigError(format!(
                "chroma range invalid: fmin={} octaves={}",
                self.chroma_fmin, self.chroma_octaves
            )));
        }
        if !(self.waveform_preference_margin.is_finite() && self.waveform_preference_margin >= 0.0)
        {
            return Err(SyncError::ConfigError(format!(
                "waveform_preference_margin must be non-negative, got {}",
                self.waveform_preference_margin
            )));
        }
        if !self.low_confidence_threshold.is_finite() {
            return Err(SyncError::ConfigError(
                "low_confidence_threshold must be finite".into(),
            ));
        }
        Ok(())
    }

    /// Builder pattern: set analysis window
    pub fn with_analyze_duration(mut self, seconds: f64) -> Self {
        self.analyze_duration = seconds;
        self
    }

    /// Builder pattern: set analysis sample rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.analysis_sample_rate = sample_rate;
        self
    }

    /// Builder pattern: set chroma hop length
    pub fn with_hop_length(mut self, hop_length: usize) -> Self {
        self.chroma_hop_length = hop_length;
        self
    }

    /// Builder pattern: set chroma FFT size
    pub fn with_fft_size(mut self, size: usize) -> Self {
        self.chroma_fft_size = size;
        self
    }

    /// Builder pattern: set waveform preference margin
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.waveform_preference_margin = margin;
        self
    }

    /// Builder pattern: set decoder
    pub fn with_decoder(mut self, decoder: DecoderKind) -> Self {
        self.decoder = decoder;
        self
    }

    /// Builder pattern: set correlation method
    pub fn with_correlation_method(mut self, method: CorrelationMethod) -> Self {
        self.correlation_method = method;
        self
    }

    /// Builder pattern: run everything on the calling thread
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Encoding settings for the merge step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Constant output frame rate (VFR sources drift otherwise)
    pub frame_rate: u32,

    /// ffmpeg video codec
    pub video_codec: String,

    /// x264 preset
    pub preset: String,

    /// x264 constant rate factor
    pub crf: u8,

    /// ffmpeg audio codec
    pub audio_codec: String,

    /// Audio bitrate, ffmpeg syntax
    pub audio_bitrate: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            video_codec: "libx264".into(),
            preset: "fast".into(),
            crf: 18,
            audio_codec: "aac".into(),
            audio_bitrate: "192k".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.analyze_duration, 40.0);
        assert_eq!(config.analysis_sample_rate, 22050);
        assert_eq!(config.chroma_hop_length, 512);
        assert_eq!(config.waveform_preference_margin, 0.8);
        assert_eq!(config.low_confidence_threshold, 3.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = SyncConfig::default()
            .with_analyze_duration(10.0)
            .with_sample_rate(8000)
            .with_hop_length(256)
            .with_margin(0.5)
            .sequential();

        assert_eq!(config.analyze_duration, 10.0);
        assert_eq!(config.analysis_sample_rate, 8000);
        assert_eq!(config.chroma_hop_length, 256);
        assert_eq!(config.waveform_preference_margin, 0.5);
        assert!(!config.parallel);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SyncConfig::default().with_sample_rate(0).validate().is_err());
        assert!(SyncConfig::default().with_hop_length(0).validate().is_err());
        assert!(SyncConfig::default().with_fft_size(3000).validate().is_err());
        assert!(SyncConfig::default().with_analyze_duration(-1.0).validate().is_err());
        assert!(SyncConfig::default().with_margin(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{ "analyze_duration": 20.0, "decoder": "native" }"#).unwrap();
        assert_eq!(config.analyze_duration, 20.0);
        assert_eq!(config.decoder, DecoderKind::Native);
        assert_eq!(config.analysis_sample_rate, 22050);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        std::fs::write(&path, r#"{ "chroma_hop_length": 1024 }"#).unwrap();

        let config = SyncConfig::from_json_file(&path).unwrap();
        assert_eq!(config.chroma_hop_length, 1024);

        std::fs::write(&path, r#"{ "chroma_hop_length": 0 }"#).unwrap();
        assert!(matches!(
            SyncConfig::from_json_file(&path),
            Err(SyncError::ConfigError(_))
        ));
    }

    #[test]
    fn test_merge_defaults() {
        let config = MergeConfig::default();
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.crf, 18);
        assert_eq!(config.audio_bitrate, "192k");
    }
}
