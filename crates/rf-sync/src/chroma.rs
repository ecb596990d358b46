//! Chromagram-based pitch profiles
//!
//! A constant-Q-style chroma: centered Hann STFT, then a sparse kernel maps
//! FFT magnitudes onto semitone bins (triangular response, one semitone
//! half-width, so bandwidth scales with center frequency) that fold into the
//! 12 pitch classes. Every frame is scaled to a maximum of 1, which makes the
//! profile independent of level, EQ and compression.

use crate::buffer::SampleBuffer;
use crate::config::SyncConfig;
use crate::correlation::{estimate_offset, CorrelationMethod, CorrelationResult};
use crate::{Result, SyncError};
use num_complex::Complex64;
use rayon::prelude::*;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Number of pitch classes
pub const PITCH_CLASSES: usize = 12;

/// Frames whose strongest pitch class is below this are treated as silence
const SILENCE_FLOOR: f64 = 1e-10;

/// One chroma frame, index 0 = C
pub type ChromaFrame = [f64; PITCH_CLASSES];

/// Per-frame pitch energy (sum over the 12 normalized pitch classes)
#[derive(Debug, Clone, PartialEq)]
pub struct PitchProfile {
    energies: Vec<f64>,
    hop_length: usize,
    sample_rate: u32,
}

impl PitchProfile {
    /// Energy per frame
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.energies.len()
    }

    /// No frames at all
    pub fn is_empty(&self) -> bool {
        self.energies.is_empty()
    }

    /// Samples per frame
    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Seconds per frame
    pub fn frame_duration(&self) -> f64 {
        self.hop_length as f64 / self.sample_rate as f64
    }

    /// Every frame is silent
    pub fn is_silent(&self) -> bool {
        self.energies.iter().all(|&e| e == 0.0)
    }
}

/// Semitone bin: FFT bins with weights, and the pitch class it folds into
#[derive(Debug, Clone)]
struct PitchBin {
    taps: Vec<(usize, f64)>,
    pitch_class: usize,
}

/// STFT + log-frequency kernel chroma extractor
pub struct ChromaAnalyzer {
    fft_size: usize,
    hop_size: usize,
    sample_rate: u32,
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    bins: Vec<PitchBin>,
}

impl ChromaAnalyzer {
    /// Create analyzer
    ///
    /// `fmin` is the lowest semitone center; `octaves * 12` semitone bins are
    /// used (bins above Nyquist are dropped).
    pub fn new(
        fft_size: usize,
        hop_size: usize,
        sample_rate: u32,
        fmin: f64,
        octaves: usize,
    ) -> Result<Self> {
        if !fft_size.is_power_of_two() {
            return Err(SyncError::ConfigError(format!(
                "FFT size must be power of 2, got {}",
                fft_size
            )));
        }
        if hop_size == 0 || sample_rate == 0 {
            return Err(SyncError::ConfigError(format!(
                "hop size and sample rate must be positive (hop={}, sr={})",
                hop_size, sample_rate
            )));
        }
        if fmin.is_nan() || fmin <= 0.0 {
            return Err(SyncError::ConfigError(format!("fmin must be positive, got {}", fmin)));
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Periodic Hann window
        let window: Vec<f64> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / fft_size as f64).cos())
            })
            .collect();

        let bins = build_kernel(fft_size, sample_rate, fmin, octaves * PITCH_CLASSES);

        Ok(Self {
            fft_size,
            hop_size,
            sample_rate,
            fft,
            window,
            bins,
        })
    }

    /// Analyzer for the rate of `sample_rate` with the chroma settings of `config`
    pub fn from_config(config: &SyncConfig, sample_rate: u32) -> Result<Self> {
        Self::new(
            config.chroma_fft_size,
            config.chroma_hop_length,
            sample_rate,
            config.chroma_fmin,
            config.chroma_octaves,
        )
    }

    /// Number of frames produced for `num_samples` input samples
    pub fn num_frames(&self, num_samples: usize) -> usize {
        1 + num_samples / self.hop_size
    }

    /// Normalized chroma, one frame every `hop_size` samples
    ///
    /// Frames are centered: frame `t` covers samples
    /// `t * hop - fft_size / 2 .. t * hop + fft_size / 2`, zero padded.
    pub fn chromagram(&self, samples: &[f64]) -> Result<Vec<ChromaFrame>> {
        let num_frames = self.num_frames(samples.len());

        (0..num_frames)
            .into_par_iter()
            .map_init(
                || -> (Vec<f64>, Vec<Complex64>, Vec<f64>) {
                    (
                        self.fft.make_input_vec(),
                        self.fft.make_output_vec(),
                        vec![0.0; self.fft_size / 2 + 1],
                    )
                },
                |(input, spectrum, magnitude), frame_idx| {
                    self.frame(samples, frame_idx, input, spectrum, magnitude)
                },
            )
            .collect()
    }

    /// Chroma of frame `frame_idx`, using caller-owned scratch buffers
    fn frame(
        &self,
        samples: &[f64],
        frame_idx: usize,
        input: &mut [f64],
        spectrum: &mut [Complex64],
        magnitude: &mut [f64],
    ) -> Result<ChromaFrame> {
        let pad = (self.fft_size / 2) as isize;
        let start = (frame_idx * self.hop_size) as isize - pad;

        for (i, slot) in input.iter_mut().enumerate() {
            let idx = start + i as isize;
            let sample = if idx >= 0 && (idx as usize) < samples.len() {
                samples[idx as usize]
            } else {
                0.0
            };
            *slot = sample * self.window[i];
        }

        self.fft
            .process(input, spectrum)
            .map_err(|e| SyncError::FftError(e.to_string()))?;
        for (mag, bin) in magnitude.iter_mut().zip(spectrum.iter()) {
            *mag = bin.norm();
        }

        Ok(self.fold(magnitude))
    }

    /// Chroma summed over pitch classes
    pub fn pitch_profile(&self, buffer: &SampleBuffer) -> Result<PitchProfile> {
        let energies = self
            .chromagram(&buffer.to_f64())?
            .iter()
            .map(|frame| frame.iter().sum())
            .collect();

        Ok(PitchProfile {
            energies,
            hop_length: self.hop_size,
            sample_rate: self.sample_rate,
        })
    }

    /// Pitch class of a frequency (0 = C)
    pub fn pitch_class(freq: f64) -> usize {
        let midi = 69.0 + 12.0 * (freq / 440.0).log2();
        (midi.round() as i64).rem_euclid(PITCH_CLASSES as i64) as usize
    }

    fn fold(&self, magnitude: &[f64]) -> ChromaFrame {
        let mut chroma = [0.0; PITCH_CLASSES];
        for bin in &self.bins {
            let energy: f64 = bin.taps.iter().map(|&(j, w)| magnitude[j] * w).sum();
            chroma[bin.pitch_class] += energy;
        }

        let peak = chroma.iter().copied().fold(0.0, f64::max);
        if peak > SILENCE_FLOOR {
            chroma.iter_mut().for_each(|c| *c /= peak);
        } else {
            chroma = [0.0; PITCH_CLASSES];
        }
        chroma
    }
}

fn build_kernel(fft_size: usize, sample_rate: u32, fmin: f64, num_bins: usize) -> Vec<PitchBin> {
    let nyquist = sample_rate as f64 / 2.0;
    let bin_hz = sample_rate as f64 / fft_size as f64;
    let num_fft_bins = fft_size / 2 + 1;
    let base_class = ChromaAnalyzer::pitch_class(fmin);

    (0..num_bins)
        .filter_map(|k| {
            let center = fmin * 2f64.powf(k as f64 / PITCH_CLASSES as f64);
            if center >= nyquist {
                return None;
            }

            let mut taps: Vec<(usize, f64)> = (1..num_fft_bins)
                .filter_map(|j| {
                    let semitones = 12.0 * (j as f64 * bin_hz / center).log2();
                    let weight = 1.0 - semitones.abs();
                    (weight > 0.0).then_some((j, weight))
                })
                .collect();

            // Low bins narrower than the FFT resolution take the nearest bin
            if taps.is_empty() {
                let nearest = ((center / bin_hz).round() as usize).clamp(1, num_fft_bins - 1);
                taps.push((nearest, 1.0));
            }

            let total: f64 = taps.iter().map(|&(_, w)| w).sum();
            taps.iter_mut().for_each(|(_, w)| *w /= total);

            Some(PitchBin {
                taps,
                pitch_class: (base_class + k) % PITCH_CLASSES,
            })
        })
        .collect()
}

/// Pitch-content offset estimator
pub struct ChromaCorrelator {
    config: SyncConfig,
}

impl ChromaCorrelator {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Offset of `mastered` relative to `scratch`, quantized to the hop
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

        let analyzer = ChromaAnalyzer::from_config(&self.config, scratch.sample_rate())?;
        let profile1 = analyzer.pitch_profile(scratch)?;
        let profile2 = analyzer.pitch_profile(mastered)?;
        log::debug!(
            "Pitch profiles: {} and {} frames of {:.1}ms",
            profile1.len(),
            profile2.len(),
            profile1.frame_duration() * 1000.0
        );

        self.correlate_profiles(&profile1, &profile2)
    }

    /// Offset between two precomputed profiles
    pub fn correlate_profiles(
        &self,
        profile1: &PitchProfile,
        profile2: &PitchProfile,
    ) -> Result<CorrelationResult> {
        let result = estimate_offset(
            profile1.energies(),
            profile2.energies(),
            self.method(),
            false,
            profile1.frame_duration(),
        )?;

        if result.degenerate {
            log::warn!("Chromagram correlation is degenerate (silent or too short input)");
        }
        Ok(result)
    }

    fn method(&self) -> CorrelationMethod {
        self.config.correlation_method
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    const SR: u32 = 22050;

    fn tone(freqs: &[f64], len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / SR as f64;
                freqs
                    .iter()
                    .map(|f| (2.0 * std::f64::consts::PI * f * t).sin())
                    .sum::<f64>()
                    * 0.3
            })
            .collect()
    }

    /// Notes, chords and rests changing every 4096 samples
    fn phrase(len: usize) -> Vec<f32> {
        let pattern: [&[f64]; 6] = [
            &[261.63],
            &[329.63, 392.0],
            &[],
            &[220.0, 277.18, 329.63],
            &[493.88],
            &[],
        ];
        let segment = 4096;
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let notes = pattern[rng.random_range(0..pattern.len())];
            let take = segment.min(len - out.len());
            out.extend(tone(notes, take).into_iter().map(|s| s as f32));
        }
        out
    }

    fn analyzer() -> ChromaAnalyzer {
        ChromaAnalyzer::from_config(&SyncConfig::default(), SR).unwrap()
    }

    #[test]
    fn test_rejects_bad_fft_size() {
        assert!(ChromaAnalyzer::new(1000, 512, SR, 32.703, 7).is_err());
        assert!(ChromaAnalyzer::new(4096, 0, SR, 32.703, 7).is_err());
    }

    #[test]
    fn test_pitch_class() {
        assert_eq!(ChromaAnalyzer::pitch_class(440.0), 9);
        assert_eq!(ChromaAnalyzer::pitch_class(261.63), 0);
        assert_eq!(ChromaAnalyzer::pitch_class(32.703), 0);
        assert_eq!(ChromaAnalyzer::pitch_class(493.88), 11);
    }

    #[test]
    fn test_a440_lands_in_pitch_class_a() {
        let chroma = analyzer().chromagram(&tone(&[440.0], SR as usize)).unwrap();
        let middle = &chroma[chroma.len() / 2];

        let peak = middle
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();

        assert_eq!(peak, 9);
        assert_relative_eq!(middle[9], 1.0);
    }

    #[test]
    fn test_profile_length_follows_hop() {
        let analyzer = analyzer();
        let buffer = SampleBuffer::new(phrase(10_000), SR).unwrap();
        let profile = analyzer.pitch_profile(&buffer).unwrap();

        assert_eq!(profile.len(), 1 + 10_000 / 512);
        assert!(profile.energies().iter().all(|&e| e >= 0.0));
        assert!(profile.energies().iter().all(|&e| e <= PITCH_CLASSES as f64 + 1e-9));
    }

    #[test]
    fn test_fft_failure_is_an_error() {
        let analyzer = analyzer();
        let samples = tone(&[440.0], 8192);
        let mut input = vec![0.0; 4096];
        let mut magnitude = vec![0.0; 2049];

        // Spectrum one bin short of what the transform writes
        let mut spectrum = vec![Complex64::new(0.0, 0.0); 2048];
        let err = analyzer
            .frame(&samples, 4, &mut input, &mut spectrum, &mut magnitude)
            .unwrap_err();
        assert!(matches!(err, SyncError::FftError(_)));

        let mut spectrum = vec![Complex64::new(0.0, 0.0); 2049];
        let frame = analyzer
            .frame(&samples, 4, &mut input, &mut spectrum, &mut magnitude)
            .unwrap();
        assert_relative_eq!(frame[9], 1.0);
    }

    #[test]
    fn test_silence_gives_zero_profile() {
        let buffer = SampleBuffer::new(vec![0.0; 8192], SR).unwrap();
        let profile = analyzer().pitch_profile(&buffer).unwrap();
        assert!(profile.is_silent());
    }

    #[test]
    fn test_level_does_not_change_profile() {
        let analyzer = analyzer();
        let buffer = SampleBuffer::new(phrase(30_000), SR).unwrap();
        let loud = analyzer.pitch_profile(&buffer).unwrap();
        let quiet = analyzer.pitch_profile(&buffer.scaled(0.05)).unwrap();

        for (a, b) in loud.energies().iter().zip(quiet.energies()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_identity_has_zero_offset() {
        let buffer = SampleBuffer::new(phrase(SR as usize * 4), SR).unwrap();
        let result = ChromaCorrelator::new(&SyncConfig::default())
            .correlate(&buffer, &buffer)
            .unwrap();

        assert_eq!(result.offset_seconds, 0.0);
        assert!(result.confidence > 1.0);
        assert!(!result.degenerate);
    }

    #[test]
    fn test_known_shift_in_frames() {
        let hop = 512;
        let shift_frames = 12;
        let signal = phrase(SR as usize * 5);
        let scratch = SampleBuffer::new(signal.clone(), SR).unwrap();
        let mastered = SampleBuffer::new(signal[shift_frames * hop..].to_vec(), SR).unwrap();

        let result = ChromaCorrelator::new(&SyncConfig::default())
            .correlate(&scratch, &mastered)
            .unwrap();

        let expected = (shift_frames * hop) as f64 / SR as f64;
        assert!((result.offset_seconds - expected).abs() <= hop as f64 / SR as f64 + 1e-9);
    }

    #[test]
    fn test_silence_is_degenerate_not_error() {
        let silence = SampleBuffer::new(vec![0.0; 16_384], SR).unwrap();
        let result = ChromaCorrelator::new(&SyncConfig::default())
            .correlate(&silence, &silence)
            .unwrap();

        assert!(result.degenerate);
        assert!(result.confidence.is_finite());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_sample_rate_mismatch() {
        let a = SampleBuffer::new(vec![0.1; 4096], 22050).unwrap();
        let b = SampleBuffer::new(vec![0.1; 4096], 44100).unwrap();
        assert!(matches!(
            ChromaCorrelator::new(&SyncConfig::default()).correlate(&a, &b),
            Err(SyncError::InvalidBuffer(_))
        ));
    }
}
