//! Choice between the waveform and chromagram estimates

use crate::correlation::CorrelationResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Estimator that produced the final offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMethod {
    Waveform,
    Chromagram,
}

impl SyncMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMethod::Waveform => "waveform",
            SyncMethod::Chromagram => "chromagram",
        }
    }
}

impl fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final offset handed to the merge step
///
/// `offset_seconds >= 0`: the replacement audio starts later than the
/// video's audio and is delayed. `< 0`: that many seconds are trimmed from
/// the start of the replacement audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub offset_seconds: f64,
    pub confidence: f64,
    pub method: SyncMethod,
}

impl SyncResult {
    /// Below `threshold` the alignment should be double-checked
    pub fn is_low_confidence(&self, threshold: f64) -> bool {
        self.confidence < threshold
    }
}

/// Waveform wins when `waveform.confidence > chroma.confidence * margin`
///
/// Equality goes to the chromagram.
pub fn select(waveform: &CorrelationResult, chroma: &CorrelationResult, margin: f64) -> SyncResult {
    if waveform.confidence > chroma.confidence * margin {
        SyncResult {
            offset_seconds: waveform.offset_seconds,
            confidence: waveform.confidence,
            method: SyncMethod::Waveform,
        }
    } else {
        SyncResult {
            offset_seconds: chroma.offset_seconds,
            confidence: chroma.confidence,
            method: SyncMethod::Chromagram,
        }
    }
}
