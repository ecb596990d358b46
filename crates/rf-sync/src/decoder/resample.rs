//! Sample rate conversion for analysis buffers

use crate::{Result, SyncError};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Input frames per resampler call
const CHUNK_SIZE: usize = 4096;

fn sinc_parameters() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Resample mono `samples` from `from_rate` to `to_rate`
///
/// The filter delay is removed, so output sample `i` lines up with input time
/// `i / to_rate`. Output length is `ceil(len * to_rate / from_rate)`.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(SyncError::Resample(format!(
            "invalid rates {}Hz -> {}Hz",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (samples.len() as f64 * ratio).ceil() as usize;

    let mut resampler = SincFixedIn::<f64>::new(ratio, 1.0, sinc_parameters(), CHUNK_SIZE, 1)
        .map_err(|e| SyncError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();

    let input: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    let mut output: Vec<f64> = Vec::with_capacity(expected + delay + CHUNK_SIZE);
    let mut pos = 0;

    while input.len() - pos >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk = [&input[pos..pos + needed]];
        let out = resampler
            .process(&chunk[..], None)
            .map_err(|e| SyncError::Resample(e.to_string()))?;
        output.extend_from_slice(&out[0]);
        pos += needed;
    }

    if pos < input.len() {
        let tail = [&input[pos..]];
        let out = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| SyncError::Resample(e.to_string()))?;
        output.extend_from_slice(&out[0]);
    }

    // Drain the filter until the delayed tail is out
    while output.len() < expected + delay {
        let out = resampler
            .process_partial::<&[f64]>(None, None)
            .map_err(|e| SyncError::Resample(e.to_string()))?;
        if out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&out[0]);
    }

    let mut resampled: Vec<f32> = output
        .into_iter()
        .skip(delay)
        .take(expected)
        .map(|s| s as f32)
        .collect();
    resampled.resize(expected, 0.0);
    Ok(resampled)
}
