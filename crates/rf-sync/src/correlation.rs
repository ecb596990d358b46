//! Full linear cross-correlation, peak picking and confidence
//!
//! Index `k` of a full correlation of `a` against `b` corresponds to lag
//! `k - (b.len() - 1)` and holds `Σ a[n + lag] · b[n]`. A positive lag means
//! the content of `b` appears earlier in `b` than in `a`.

use crate::{Result, SyncError};
use num_complex::Complex64;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// Above this many multiply-adds `Auto` switches to the FFT path
const DIRECT_WORK_LIMIT: usize = 1 << 18;

/// How the correlation sum is evaluated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    /// Direct for short inputs, FFT otherwise
    #[default]
    Auto,
    /// O(n·m) summation
    Direct,
    /// Zero-padded real FFT
    Fft,
}

impl CorrelationMethod {
    fn resolve(self, len_a: usize, len_b: usize) -> Self {
        match self {
            Self::Auto if len_a.saturating_mul(len_b) <= DIRECT_WORK_LIMIT => Self::Direct,
            Self::Auto => Self::Fft,
            other => other,
        }
    }
}

/// Offset estimate of one correlator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    /// Shift to apply to the second input, in seconds
    pub offset_seconds: f64,

    /// Peak prominence over mean absolute correlation (>= 0, unbounded)
    pub confidence: f64,

    /// An input was too short or carried no energy
    pub degenerate: bool,
}

/// Full cross-correlation of `a` against `b` (`a.len() + b.len() - 1` values)
pub fn cross_correlate(a: &[f64], b: &[f64], method: CorrelationMethod) -> Result<Vec<f64>> {
    if a.is_empty() || b.is_empty() {
        return Ok(Vec::new());
    }

    match method.resolve(a.len(), b.len()) {
        CorrelationMethod::Fft => correlate_fft(a, b),
        _ => Ok(correlate_direct(a, b)),
    }
}

fn correlate_direct(a: &[f64], b: &[f64]) -> Vec<f64> {
    let la = a.len() as isize;
    let lb = b.len() as isize;

    (0..la + lb - 1)
        .map(|k| {
            let lag = k - (lb - 1);
            let start = (-lag).max(0);
            let end = (la - lag).min(lb);
            (start..end)
                .map(|n| a[(n + lag) as usize] * b[n as usize])
                .sum()
        })
        .collect()
}

fn correlate_fft(a: &[f64], b: &[f64]) -> Result<Vec<f64>> {
    let out_len = a.len() + b.len() - 1;
    let fft_size = out_len.next_power_of_two();

    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(fft_size);
    let inverse = planner.plan_fft_inverse(fft_size);

    let mut input_a = forward.make_input_vec();
    input_a[..a.len()].copy_from_slice(a);

    // Correlation is convolution with the time-reversed second input
    let mut input_b = forward.make_input_vec();
    for (dst, &src) in input_b.iter_mut().zip(b.iter().rev()) {
        *dst = src;
    }

    let mut spectrum_a: Vec<Complex64> = forward.make_output_vec();
    let mut spectrum_b: Vec<Complex64> = forward.make_output_vec();
    forward
        .process(&mut input_a, &mut spectrum_a)
        .map_err(|e| SyncError::FftError(e.to_string()))?;
    forward
        .process(&mut input_b, &mut spectrum_b)
        .map_err(|e| SyncError::FftError(e.to_string()))?;

    for (x, y) in spectrum_a.iter_mut().zip(&spectrum_b) {
        *x *= *y;
    }

    // DC and Nyquist must be purely real for the inverse transform
    if let Some(first) = spectrum_a.first_mut() {
        first.im = 0.0;
    }
    if let Some(last) = spectrum_a.last_mut() {
        last.im = 0.0;
    }

    let mut output = inverse.make_output_vec();
    inverse
        .process(&mut spectrum_a, &mut output)
        .map_err(|e| SyncError::FftError(e.to_string()))?;

    let scale = 1.0 / fft_size as f64;
    output.truncate(out_len);
    output.iter_mut().for_each(|v| *v *= scale);
    Ok(output)
}

/// Index of the largest value; the first one wins ties, NaN never wins
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the largest magnitude; the first one wins ties
pub fn argmax_abs(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.iter().map(|v| v.abs()).enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Mean absolute value (0 for empty input)
pub fn mean_abs(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| v.abs()).sum::<f64>() / values.len() as f64
}

/// Peak value over mean absolute correlation
///
/// Returns 0.0 whenever the ratio is undefined (flat zero curve, NaN/Inf).
pub fn peak_confidence(correlation: &[f64], peak: usize, use_abs: bool) -> f64 {
    let Some(&value) = correlation.get(peak) else {
        return 0.0;
    };
    let denominator = mean_abs(correlation);
    if !(denominator.is_finite() && denominator > 0.0) {
        return 0.0;
    }

    let numerator = if use_abs { value.abs() } else { value };
    let confidence = numerator / denominator;
    if confidence.is_finite() {
        confidence.max(0.0)
    } else {
        0.0
    }
}

/// Lag (in input units) of a full-correlation index
pub fn lag_at(peak: usize, len_b: usize) -> isize {
    peak as isize - (len_b as isize - 1)
}

/// True when a signal cannot carry an alignment
pub fn is_degenerate(values: &[f64]) -> bool {
    values.len() < 2 || values.iter().all(|&v| v == 0.0)
}

/// Correlate, pick the peak and convert its lag to seconds
///
/// `seconds_per_lag` is `1 / sr` for raw samples and `hop / sr` for frames.
/// With `use_abs` the peak of |correlation| is taken, so inverted polarity
/// still aligns.
pub fn estimate_offset(
    a: &[f64],
    b: &[f64],
    method: CorrelationMethod,
    use_abs: bool,
    seconds_per_lag: f64,
) -> Result<CorrelationResult> {
    let degenerate = is_degenerate(a) || is_degenerate(b);
    let correlation = cross_correlate(a, b, method)?;

    let peak = if use_abs {
        argmax_abs(&correlation)
    } else {
        argmax(&correlation)
    };

    let confidence = peak
        .map(|p| peak_confidence(&correlation, p, use_abs))
        .unwrap_or(0.0);

    // A zero curve has no peak worth reporting
    let offset_seconds = match peak {
        Some(p) if mean_abs(&correlation) > 0.0 => lag_at(p, b.len()) as f64 * seconds_per_lag,
        _ => 0.0,
    };

    Ok(CorrelationResult {
        offset_seconds,
        confidence,
        degenerate,
    })
}
