//! End-to-end offset detection on synthetic recordings

use approx::assert_relative_eq;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rf_sync::{
    ChromaCorrelator, CorrelationResult, DecoderKind, FfmpegDecoder, NativeDecoder,
    OffsetDetector, SampleBuffer, SyncConfig, SyncMethod, WaveformCorrelator, select,
};
use std::path::Path;

const SR: u32 = 22050;
const HOP: usize = 512;

/// Random melody over a noise floor, reproducible per seed
fn performance(len: usize, seed: u64) -> Vec<f32> {
    const NOTES: [f64; 8] = [196.0, 220.0, 261.63, 293.66, 329.63, 392.0, 440.0, 523.25];
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(len);

    while out.len() < len {
        let note_len = rng.random_range(2000..6000).min(len - out.len());
        let freq = NOTES[rng.random_range(0..NOTES.len())];
        let rest = rng.random_range(0..5) == 0;
        for i in 0..note_len {
            let t = i as f64 / SR as f64;
            let tone = if rest {
                0.0
            } else {
                0.4 * (2.0 * std::f64::consts::PI * freq * t).sin()
                    + 0.15 * (2.0 * std::f64::consts::PI * 2.0 * freq * t).sin()
            };
            let noise = (rng.random::<f64>() * 2.0 - 1.0) * 0.05;
            out.push((tone + noise) as f32);
        }
    }
    out
}

fn buffer(samples: &[f32]) -> SampleBuffer {
    SampleBuffer::new(samples.to_vec(), SR).unwrap()
}

fn correlators() -> (ChromaCorrelator, WaveformCorrelator) {
    let config = SyncConfig::default();
    (ChromaCorrelator::new(&config), WaveformCorrelator::new(&config))
}

fn write_wav(path: &Path, samples: &[f32], rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn waveform_recovers_known_shift() {
    let signal = performance(SR as usize * 6, 1);
    let shift = 3_317;
    let (_, waveform) = correlators();

    let result = waveform
        .correlate(&buffer(&signal), &buffer(&signal[shift..]))
        .unwrap();
    assert_relative_eq!(result.offset_seconds, shift as f64 / SR as f64, epsilon = 1e-9);
    assert!(result.confidence > 3.0);
}

#[test]
fn chroma_recovers_hop_aligned_shift() {
    let signal = performance(SR as usize * 8, 2);
    let shift_frames = 20;
    let (chroma, _) = correlators();

    // Shorter mastered take so the overlap is complete around the true lag
    let mastered = &signal[shift_frames * HOP..SR as usize * 6];
    let result = chroma.correlate(&buffer(&signal), &buffer(mastered)).unwrap();

    assert_relative_eq!(
        result.offset_seconds,
        (shift_frames * HOP) as f64 / SR as f64,
        epsilon = 1e-9
    );
    assert!(!result.degenerate);
}

#[test]
fn identical_sources_have_zero_offset() {
    let signal = buffer(&performance(SR as usize * 4, 3));
    let (chroma, waveform) = correlators();

    assert_eq!(waveform.correlate(&signal, &signal).unwrap().offset_seconds, 0.0);
    assert_eq!(chroma.correlate(&signal, &signal).unwrap().offset_seconds, 0.0);
}

#[test]
fn offset_sign_follows_lead_in() {
    let signal = performance(SR as usize * 5, 4);
    let shift = 11_025;
    let (_, waveform) = correlators();

    // Mastered take started late: delay it
    let late = waveform
        .correlate(&buffer(&signal), &buffer(&signal[shift..]))
        .unwrap();
    assert!(late.offset_seconds > 0.0);

    // Mastered take has extra lead-in: trim it
    let lead_in = waveform
        .correlate(&buffer(&signal[shift..]), &buffer(&signal))
        .unwrap();
    assert!(lead_in.offset_seconds < 0.0);
    assert_relative_eq!(late.offset_seconds, -lead_in.offset_seconds, epsilon = 1e-9);
}

#[test]
fn chroma_offset_sign_follows_lead_in() {
    let signal = performance(SR as usize * 8, 8);
    let shift = 10 * HOP;
    let (chroma, _) = correlators();

    // Mastered take started late: delay it
    let late = chroma
        .correlate(&buffer(&signal), &buffer(&signal[shift..SR as usize * 6]))
        .unwrap();
    assert_relative_eq!(late.offset_seconds, shift as f64 / SR as f64, epsilon = 1e-9);

    // Mastered take has extra lead-in: trim it
    let lead_in = chroma
        .correlate(&buffer(&signal[shift..SR as usize * 6]), &buffer(&signal))
        .unwrap();
    assert_relative_eq!(lead_in.offset_seconds, -(shift as f64) / SR as f64, epsilon = 1e-9);
}

#[test]
fn selector_margin() {
    let estimate = |offset_seconds: f64, confidence: f64| CorrelationResult {
        offset_seconds,
        confidence,
        degenerate: false,
    };

    assert_eq!(select(&estimate(0.1, 10.0), &estimate(0.0, 9.0), 0.8).method, SyncMethod::Waveform);
    assert_eq!(select(&estimate(0.1, 7.0), &estimate(0.0, 10.0), 0.8).method, SyncMethod::Chromagram);
    assert_eq!(select(&estimate(0.1, 8.0), &estimate(0.0, 10.0), 0.8).method, SyncMethod::Chromagram);
}

#[test]
fn silence_is_degenerate_not_an_error() {
    let silence = buffer(&vec![0.0; SR as usize * 2]);
    let (chroma, waveform) = correlators();

    for result in [
        chroma.correlate(&silence, &silence).unwrap(),
        waveform.correlate(&silence, &silence).unwrap(),
    ] {
        assert!(result.degenerate);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.offset_seconds, 0.0);
    }
}

#[test]
fn gain_does_not_move_the_offset() {
    let signal = performance(SR as usize * 6, 5);
    let shift = 10 * HOP;
    let scratch = buffer(&signal);
    let mastered = buffer(&signal[shift..SR as usize * 5]);
    let (chroma, waveform) = correlators();

    for gain in [0.1f32, 3.0] {
        let scaled = mastered.scaled(gain);
        assert_eq!(
            waveform.correlate(&scratch, &scaled).unwrap().offset_seconds,
            waveform.correlate(&scratch, &mastered).unwrap().offset_seconds
        );
        assert_eq!(
            chroma.correlate(&scratch, &scaled).unwrap().offset_seconds,
            chroma.correlate(&scratch, &mastered).unwrap().offset_seconds
        );
    }
}

#[test]
fn wav_files_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let video_audio = dir.path().join("scratch.wav");
    let mastered = dir.path().join("mastered.wav");

    // Written at 44.1kHz so the native decoder has to resample
    let signal = performance(SR as usize * 12, 6);
    let hi_rate: Vec<f32> = signal.iter().flat_map(|&s| [s, s]).collect();
    let shift = 8_820; // 0.2 s at 44.1 kHz
    write_wav(&video_audio, &hi_rate, 44_100);
    write_wav(&mastered, &hi_rate[shift..], 44_100);

    let config = SyncConfig::default().with_analyze_duration(8.0);
    let detector = OffsetDetector::new(config, Box::new(NativeDecoder::new()));
    let report = detector.detect(&video_audio, &mastered).unwrap();

    assert_relative_eq!(report.result.offset_seconds, 0.2, epsilon = 2.0 / SR as f64);
    assert_relative_eq!(report.scratch_seconds, 8.0, epsilon = 1e-3);
    assert!(!report.is_low_confidence(3.0));
}

#[test]
fn ffmpeg_and_native_agree() {
    if !FfmpegDecoder::is_available() {
        eprintln!("ffmpeg not installed, skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("scratch.wav");
    let mastered = dir.path().join("mastered.wav");
    let signal = performance(SR as usize * 10, 7);
    write_wav(&scratch, &signal, SR);
    write_wav(&mastered, &signal[4_000..], SR);

    let config = SyncConfig::default().with_analyze_duration(6.0);
    let native = OffsetDetector::new(config.clone(), Box::new(NativeDecoder::new()))
        .detect(&scratch, &mastered)
        .unwrap();
    let ffmpeg = OffsetDetector::from_config(config.with_decoder(DecoderKind::Ffmpeg))
        .unwrap()
        .detect(&scratch, &mastered)
        .unwrap();

    assert_eq!(ffmpeg.result.method, native.result.method);
    assert_relative_eq!(
        ffmpeg.result.offset_seconds,
        native.result.offset_seconds,
        epsilon = 1.0 / SR as f64
    );
}
