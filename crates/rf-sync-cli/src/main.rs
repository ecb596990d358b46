//! avsync - replace a video's scratch audio with the mastered recording
//!
//! Usage:
//!   avsync clip.mp4 mix.wav                 - write clip_synced.mp4
//!   avsync clip.mp4 mix.wav -o out.mp4      - explicit output
//!   avsync clip.mp4 mix.wav --detect-only   - print the offset, no merge
//!   avsync -v                               - print the version

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use rf_sync::{DecoderKind, MergeConfig, OffsetDetector, SyncConfig, check_tools, merge};

#[derive(Parser)]
#[command(
    name = "avsync",
    version,
    disable_version_flag = true,
    about = "Sync a video with separately recorded audio"
)]
struct Cli {
    /// Video whose audio track is the timing reference
    video: PathBuf,

    /// Mastered audio that replaces the video's audio
    audio: PathBuf,

    /// Output video (default: <video>_synced.mp4 next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with detection settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds of each source to analyze
    #[arg(long)]
    analyze_duration: Option<f64>,

    /// Analysis sample rate (Hz)
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Samples per chroma frame
    #[arg(long)]
    hop_length: Option<usize>,

    /// Waveform wins when its confidence exceeds chroma confidence times this
    #[arg(long)]
    margin: Option<f64>,

    /// Decoder: auto, native or ffmpeg
    #[arg(long)]
    decoder: Option<DecoderKind>,

    /// Only detect the offset, do not write a video
    #[arg(long)]
    detect_only: bool,

    /// Print the full detection report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Debug output
    #[arg(long, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long)]
    quiet: bool,

    /// Print version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    for (label, path) in [("Video", &cli.video), ("Audio", &cli.audio)] {
        if !path.is_file() {
            bail!("{} not found: {}", label, path.display());
        }
    }

    let config = build_config(&cli)?;

    // The merge always needs both tools; detection only when decoding through ffmpeg
    if !cli.detect_only {
        check_tools(&["ffmpeg", "ffprobe"]).context("FFmpeg not found, please install it")?;
    } else if config.decoder == DecoderKind::Ffmpeg {
        check_tools(&["ffmpeg"]).context("FFmpeg not found, please install it")?;
    }

    let detector = OffsetDetector::from_config(config).context("Invalid detection settings")?;
    let report = detector
        .detect(&cli.video, &cli.audio)
        .context("Offset detection failed")?;

    let result = report.result;
    log::info!(
        "Detected offset: {:.3}s ({}, {:.1}x confidence)",
        result.offset_seconds,
        result.method,
        result.confidence
    );
    if report.is_low_confidence(detector.config().low_confidence_threshold) {
        log::warn!("Low confidence - sync may be inaccurate");
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if cli.detect_only {
        return Ok(());
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.video));
    merge(
        &cli.video,
        &cli.audio,
        &output,
        result.offset_seconds,
        &MergeConfig::default(),
    )
    .with_context(|| format!("Failed to write {}", output.display()))?;

    Ok(())
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Defaults, then the config file, then individual flags
fn build_config(cli: &Cli) -> Result<SyncConfig> {
    let mut config = match &cli.config {
        Some(path) => SyncConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SyncConfig::default(),
    };

    if let Some(seconds) = cli.analyze_duration {
        config = config.with_analyze_duration(seconds);
    }
    if let Some(rate) = cli.sample_rate {
        config = config.with_sample_rate(rate);
    }
    if let Some(hop) = cli.hop_length {
        config = config.with_hop_length(hop);
    }
    if let Some(margin) = cli.margin {
        config = config.with_margin(margin);
    }
    if let Some(decoder) = cli.decoder {
        config = config.with_decoder(decoder);
    }

    config.validate()?;
    Ok(config)
}

fn default_output(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    video.with_file_name(format!("{}_synced.mp4", stem))
}
