//! Audio ingestion
//!
//! Every decoder produces the same thing: the first `max_duration` seconds
//! of a file, down-mixed to mono and resampled to the analysis rate.
//!
//! - [`NativeDecoder`]: hound for WAV, symphonia for everything else, rubato
//!   for rate conversion
//! - [`FfmpegDecoder`]: external `ffmpeg` writing raw `f32le` to stdout

pub mod ffmpeg;
pub mod native;
pub mod resample;

pub use ffmpeg::FfmpegDecoder;
pub use native::NativeDecoder;

use crate::buffer::SampleBuffer;
use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Turns a media file into an analysis buffer
pub trait AudioDecoder: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Decode the first `max_duration` seconds as mono at `sample_rate`
    fn decode(&self, path: &Path, sample_rate: u32, max_duration: f64) -> Result<SampleBuffer>;
}

/// Decoder selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    /// ffmpeg when installed, native otherwise
    #[default]
    Auto,
    Native,
    Ffmpeg,
}

impl DecoderKind {
    /// Instantiate the selected decoder
    pub fn create(self) -> Result<Box<dyn AudioDecoder>> {
        match self {
            DecoderKind::Auto if FfmpegDecoder::is_available() => Ok(Box::new(FfmpegDecoder::new())),
            DecoderKind::Auto | DecoderKind::Native => Ok(Box::new(NativeDecoder::new())),
            DecoderKind::Ffmpeg if FfmpegDecoder::is_available() => {
                Ok(Box::new(FfmpegDecoder::new()))
            }
            DecoderKind::Ffmpeg => Err(SyncError::ToolUnavailable("ffmpeg".into())),
        }
    }
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecoderKind::Auto => "auto",
            DecoderKind::Native => "native",
            DecoderKind::Ffmpeg => "ffmpeg",
        })
    }
}

impl FromStr for DecoderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(DecoderKind::Auto),
            "native" => Ok(DecoderKind::Native),
            "ffmpeg" => Ok(DecoderKind::Ffmpeg),
            other => Err(format!(
                "unknown decoder '{}' (expected auto, native or ffmpeg)",
                other
            )),
        }
    }
}

/// Number of source frames covering `max_duration` seconds
pub(crate) fn frame_limit(max_duration: f64, sample_rate: u32) -> usize {
    (max_duration * sample_rate as f64).round().max(0.0) as usize
}

/// Fail early with a readable message when the source is missing
pub(crate) fn ensure_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(SyncError::decode(path.display().to_string(), "file not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_kind_parse() {
        assert_eq!("auto".parse::<DecoderKind>().unwrap(), DecoderKind::Auto);
        assert_eq!("FFmpeg".parse::<DecoderKind>().unwrap(), DecoderKind::Ffmpeg);
        assert_eq!("native".parse::<DecoderKind>().unwrap(), DecoderKind::Native);
        assert!("gstreamer".parse::<DecoderKind>().is_err());
        assert_eq!(DecoderKind::Native.to_string(), "native");
    }

    #[test]
    fn test_native_always_available() {
        let decoder = DecoderKind::Native.create().unwrap();
        assert_eq!(decoder.name(), "native");
    }

    #[test]
    fn test_auto_matches_tool_presence() {
        let decoder = DecoderKind::Auto.create().unwrap();
        let expected = if FfmpegDecoder::is_available() {
            "ffmpeg"
        } else {
            "native"
        };
        assert_eq!(decoder.name(), expected);
    }

    #[test]
    fn test_frame_limit() {
        assert_eq!(frame_limit(40.0, 22050), 882_000);
        assert_eq!(frame_limit(0.5, 44100), 22_050);
        assert_eq!(frame_limit(-1.0, 44100), 0);
    }
}
