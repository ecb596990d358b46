//! Pure Rust decoding (hound for WAV, symphonia for everything else)

use super::resample::resample;
use super::{AudioDecoder, ensure_exists, frame_limit};
use crate::buffer::SampleBuffer;
use crate::{Result, SyncError};
use std::path::Path;
use symphonia::core::audio::SampleBuffer as InterleavedBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Mono samples at the file's own rate
#[derive(Debug, Clone)]
struct MonoAudio {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// In-process decoder, no external tools needed
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDecoder;

impl NativeDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode the first `max_duration` seconds at the file's own rate
    fn load_mono(path: &Path, max_duration: f64) -> Result<MonoAudio> {
        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        {
            return Self::load_wav(path, max_duration);
        }

        Self::load_symphonia(path, max_duration)
    }

    fn load_wav(path: &Path, max_duration: f64) -> Result<MonoAudio> {
        let path_str = path.display().to_string();
        let mut reader =
            hound::WavReader::open(path).map_err(|e| SyncError::decode(&path_str, e.to_string()))?;

        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            return Err(SyncError::decode(&path_str, "no channels"));
        }
        let limit = frame_limit(max_duration, spec.sample_rate).saturating_mul(channels);

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .take(limit)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| SyncError::decode(&path_str, e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .take(limit)
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| SyncError::decode(&path_str, e.to_string()))?
            }
        };

        Ok(MonoAudio {
            samples: downmix(&interleaved, channels),
            sample_rate: spec.sample_rate,
        })
    }

    fn load_symphonia(path: &Path, max_duration: f64) -> Result<MonoAudio> {
        let path_str = path.display().to_string();
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| SyncError::decode(&path_str, e.to_string()))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| SyncError::decode(&path_str, "no audio track"))?;

        let track_id = track.id;
        let track_frames = track.codec_params.n_frames;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| SyncError::decode(&path_str, "unknown sample rate"))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| SyncError::decode(&path_str, e.to_string()))?;

        let limit = frame_limit(max_duration, sample_rate);
        // The window may be far longer than the file
        let reserve = track_frames.map_or(0, |n| limit.min(n as usize));
        let mut samples: Vec<f32> = Vec::with_capacity(reserve);
        let mut interleaved: Option<InterleavedBuffer<f32>> = None;

        while samples.len() < limit {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(SyncError::decode(&path_str, e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt packet: skip it, the stream usually recovers
                Err(SymphoniaError::DecodeError(msg)) => {
                    log::debug!("{}: skipping bad packet ({})", path_str, msg);
                    continue;
                }
                Err(e) => return Err(SyncError::decode(&path_str, e.to_string())),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);
            let needed = decoded.capacity() * channels;
            if interleaved.as_ref().is_none_or(|buf| buf.capacity() < needed) {
                interleaved = Some(InterleavedBuffer::new(decoded.capacity() as u64, spec));
            }
            let Some(buf) = interleaved.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);
            samples.extend(downmix(buf.samples(), channels));
        }

        samples.truncate(limit);
        Ok(MonoAudio {
            samples,
            sample_rate,
        })
    }
}

impl AudioDecoder for NativeDecoder {
    fn name(&self) -> &'static str {
        "native"
    }

    fn decode(&self, path: &Path, sample_rate: u32, max_duration: f64) -> Result<SampleBuffer> {
        ensure_exists(path)?;
        let path_str = path.display().to_string();

        let mono = Self::load_mono(path, max_duration)?;
        if mono.samples.is_empty() {
            return Err(SyncError::decode(&path_str, "no audio samples decoded"));
        }
        log::debug!(
            "{}: {} frames at {}Hz, resampling to {}Hz",
            path_str,
            mono.samples.len(),
            mono.sample_rate,
            sample_rate
        );

        let samples = resample(&mono.samples, mono.sample_rate, sample_rate)?;
        SampleBuffer::new(samples, sample_rate)
    }
}

/// Channel mean of interleaved frames
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    let scale = 1.0 / channels as f32;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}
