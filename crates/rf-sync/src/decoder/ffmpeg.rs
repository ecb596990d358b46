//! Decoding through an external ffmpeg process

use super::{AudioDecoder, ensure_exists};
use crate::buffer::SampleBuffer;
use crate::{Result, SyncError};
use std::path::Path;
use std::process::Command;

/// Check that `tool -version` runs and exits cleanly
pub fn tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Decoder that pipes raw mono `f32le` out of ffmpeg
///
/// Handles any container ffmpeg understands, including the audio stream of
/// a video file.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    binary: String,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    /// Use a specific ffmpeg executable
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Check if ffmpeg is on the PATH
    pub fn is_available() -> bool {
        tool_available("ffmpeg")
    }

    /// Argument list for one decode
    pub fn command_args(path: &Path, sample_rate: u32, max_duration: f64) -> Vec<String> {
        vec![
            "-nostdin".into(),
            "-v".into(),
            "error".into(),
            "-i".into(),
            path.display().to_string(),
            "-t".into(),
            format!("{}", max_duration),
            "-map".into(),
            "0:a:0".into(),
            "-vn".into(),
            "-ac".into(),
            "1".into(),
            "-ar".into(),
            sample_rate.to_string(),
            "-f".into(),
            "f32le".into(),
            "pipe:1".into(),
        ]
    }
}

impl AudioDecoder for FfmpegDecoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn decode(&self, path: &Path, sample_rate: u32, max_duration: f64) -> Result<SampleBuffer> {
        ensure_exists(path)?;
        let path_str = path.display().to_string();

        let output = Command::new(&self.binary)
            .args(Self::command_args(path, sample_rate, max_duration))
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SyncError::ToolUnavailable(self.binary.clone()),
                _ => SyncError::Io(e),
            })?;

        if !output.status.success() {
            return Err(SyncError::decode(
                &path_str,
                format!(
                    "ffmpeg failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let samples = parse_f32le(&output.stdout);
        if samples.is_empty() {
            return Err(SyncError::decode(&path_str, "no audio samples decoded"));
        }
        log::debug!("{}: {} samples from ffmpeg", path_str, samples.len());

        SampleBuffer::new(samples, sample_rate)
    }
}

/// Little-endian f32 samples; a trailing partial sample is dropped
pub fn parse_f32le(bytes: &[u8]) -> Vec<f32> {
    let chunks = bytes.chunks_exact(4);
    if !chunks.remainder().is_empty() {
        log::warn!(
            "Ignoring {} trailing bytes in ffmpeg output",
            chunks.remainder().len()
        );
    }
    chunks
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
