//! Raw waveform correlation
//!
//! Sample-precise, but only trustworthy when both sources went through a
//! similar recording chain.

use crate::buffer::SampleBuffer;
use crate::config::SyncConfig;
use crate::correlation::{estimate_offset, CorrelationMethod, CorrelationResult};
use crate::{Result, SyncError};

/// Waveform offset estimator
pub struct WaveformCorrelator {
    method: CorrelationMethod,
}

impl WaveformCorrelator {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            method: config.correlation_method,
        }
    }

    /// Offset of `mastered` relative to `scratch`, one-sample resolution
    ///
    /// The peak of |correlation| is used, so a polarity-inverted recording
    /// aligns as well as a matching one.
    pub fn correlate(
        &self,
        scratch: &SampleBuffer,
        mastered: &SampleBuffer,
    ) -> Result<CorrelationResult> {
        if scratch.sample_rate() != mastered.sample_rate() {
            return Err(SyncError::InvalidBuffer(format!(
                "sample rate mismatch: {}Hz vs {}Hz",
                scratch.sample_rate(),
                mastered.sample_rate()
            )));
        }

        let result = estimate_offset(
            &scratch.to_f64(),
            &mastered.to_f64(),
            self.method,
            true,
            1.0 / scratch.sample_rate() as f64,
        )?;

        if result.degenerate {
            log::warn!("Waveform correlation is degenerate (silent or too short input)");
        }
        Ok(result)
    }
}
