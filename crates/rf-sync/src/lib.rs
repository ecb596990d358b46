//! # rf-sync
//!
//! Cross-correlation offset detection between a video's scratch audio and a
//! separately recorded (mastered) audio track.
//!
//! ## Features
//!
//! - **Ingestion**: pure Rust (symphonia/hound + rubato) or ffmpeg decoding
//!   to a fixed-rate mono buffer
//! - **Chromagram correlation**: pitch-energy profiles, robust to EQ,
//!   compression, reverb and re-encoding
//! - **Waveform correlation**: sample-precise when both sources are similar
//! - **Selection**: waveform wins unless its confidence is meaningfully worse
//! - **Merge**: ffmpeg command plans that apply the detected offset
//!
//! ## Example
//!
//! ```rust,ignore
//! use rf_sync::{OffsetDetector, SyncConfig};
//!
//! let detector = OffsetDetector::from_config(SyncConfig::default())?;
//! let report = detector.detect("clip.mp4", "mix.wav")?;
//!
//! println!(
//!     "offset {:.3}s via {} ({:.1}x)",
//!     report.result.offset_seconds, report.result.method, report.result.confidence
//! );
//! ```

pub mod buffer;
pub mod chroma;
pub mod config;
pub mod correlation;
pub mod decoder;
pub mod detector;
pub mod error;
pub mod merge;
pub mod selector;
pub mod waveform;

pub use buffer::SampleBuffer;
pub use chroma::{ChromaCorrelator, PitchProfile};
pub use config::{MergeConfig, SyncConfig};
pub use correlation::{CorrelationMethod, CorrelationResult};
pub use decoder::{AudioDecoder, DecoderKind, FfmpegDecoder, NativeDecoder};
pub use detector::{OffsetDetector, SyncReport};
pub use error::{Result, SyncError};
pub use merge::{MergePlan, check_tools, merge, probe_duration};
pub use selector::{SyncMethod, SyncResult, select};
pub use waveform::WaveformCorrelator;

use std::path::Path;

/// Detect the offset with default settings
pub fn find_offset(video_path: impl AsRef<Path>, audio_path: impl AsRef<Path>) -> Result<SyncResult> {
    let detector = OffsetDetector::from_config(SyncConfig::default())?;
    Ok(detector.detect(video_path, audio_path)?.result)
}
