//! Muxing the replacement audio into the video with ffmpeg
//!
//! The output video always runs for the length of the replacement audio and
//! is re-encoded at a constant frame rate, so variable-frame-rate phone
//! footage does not drift against the new track.

use crate::config::MergeConfig;
use crate::decoder::ffmpeg::tool_available;
use crate::{Result, SyncError};
use std::path::Path;
use std::process::Command;

/// Fail with [`SyncError::ToolUnavailable`] for the first missing tool
pub fn check_tools(tools: &[&str]) -> Result<()> {
    for tool in tools {
        if !tool_available(tool) {
            return Err(SyncError::ToolUnavailable((*tool).to_string()));
        }
    }
    Ok(())
}

/// Container duration in seconds, as reported by ffprobe
pub fn probe_duration(path: impl AsRef<Path>) -> Result<f64> {
    let path = path.as_ref();
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SyncError::ToolUnavailable("ffprobe".into()),
            _ => SyncError::Io(e),
        })?;

    if !output.status.success() {
        return Err(SyncError::ProbeFailed(format!(
            "{}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_duration(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| SyncError::ProbeFailed(format!("{}: no duration reported", path.display())))
}

fn parse_duration(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// How the detected offset is applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergePlan {
    /// Audio starts `offset` seconds into the video: shift it with
    /// `-itsoffset`, then cut the result to the audio's length
    DelayAudio { offset: f64, audio_duration: f64 },

    /// Audio has `trim` seconds of extra lead-in: skip them and encode the
    /// remaining `duration` seconds in one pass
    TrimAudio { trim: f64, duration: f64 },
}

impl MergePlan {
    /// Plan for `offset` against replacement audio of `audio_duration` seconds
    pub fn from_offset(offset: f64, audio_duration: f64) -> Result<Self> {
        if !offset.is_finite() || !audio_duration.is_finite() {
            return Err(SyncError::MergeFailed(format!(
                "invalid timing: offset={} audio_duration={}",
                offset, audio_duration
            )));
        }

        if offset >= 0.0 {
            return Ok(MergePlan::DelayAudio {
                offset,
                audio_duration,
            });
        }

        let trim = -offset;
        let duration = audio_duration - trim;
        if duration <= 0.0 {
            return Err(SyncError::MergeFailed(format!(
                "trimming {:.3}s leaves no audio (duration {:.3}s)",
                trim, audio_duration
            )));
        }
        Ok(MergePlan::TrimAudio { trim, duration })
    }

    /// Whether the plan goes through an intermediate file
    pub fn needs_temp_file(&self) -> bool {
        matches!(self, MergePlan::DelayAudio { .. })
    }

    /// ffmpeg argument lists, run in order
    ///
    /// `temp` is only referenced by [`MergePlan::DelayAudio`].
    pub fn commands(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        temp: &Path,
        config: &MergeConfig,
    ) -> Vec<Vec<String>> {
        let path = |p: &Path| p.display().to_string();

        match *self {
            MergePlan::DelayAudio {
                offset,
                audio_duration,
            } => {
                let mut sync = vec![
                    "-y".to_string(),
                    "-i".into(),
                    path(video),
                    "-itsoffset".into(),
                    offset.to_string(),
                    "-i".into(),
                    path(audio),
                ];
                sync.extend(encode_args(config));
                sync.push(path(temp));

                let trim = vec![
                    "-y".to_string(),
                    "-ss".into(),
                    offset.to_string(),
                    "-i".into(),
                    path(temp),
                    "-t".into(),
                    audio_duration.to_string(),
                    "-c".into(),
                    "copy".into(),
                    "-movflags".into(),
                    "+faststart".into(),
                    path(output),
                ];

                vec![sync, trim]
            }
            MergePlan::TrimAudio { trim, duration } => {
                let mut cmd = vec![
                    "-y".to_string(),
                    "-i".into(),
                    path(video),
                    "-ss".into(),
                    trim.to_string(),
                    "-i".into(),
                    path(audio),
                ];
                cmd.extend(encode_args(config));
                cmd.extend([
                    "-t".into(),
                    duration.to_string(),
                    "-movflags".into(),
                    "+faststart".into(),
                    path(output),
                ]);

                vec![cmd]
            }
        }
    }
}

/// Stream mapping plus CFR video and audio encode settings
fn encode_args(config: &MergeConfig) -> Vec<String> {
    vec![
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-fps_mode".into(),
        "cfr".into(),
        "-r".into(),
        config.frame_rate.to_string(),
        "-c:v".into(),
        config.video_codec.clone(),
        "-preset".into(),
        config.preset.clone(),
        "-crf".into(),
        config.crf.to_string(),
        "-c:a".into(),
        config.audio_codec.clone(),
        "-b:a".into(),
        config.audio_bitrate.clone(),
    ]
}

/// Write `output`: the video of `video` with `audio` shifted by `offset`
pub fn merge(
    video: impl AsRef<Path>,
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
    offset: f64,
    config: &MergeConfig,
) -> Result<()> {
    let (video, audio, output) = (video.as_ref(), audio.as_ref(), output.as_ref());

    let audio_duration = probe_duration(audio)?;
    log::info!("New audio duration: {:.3}s", audio_duration);
    log::info!("Merging with offset: {:.3}s", offset);

    let plan = MergePlan::from_offset(offset, audio_duration)?;
    match plan {
        MergePlan::DelayAudio { offset, .. } => {
            log::info!("Delaying audio by {:.3}s, converting to {}fps CFR", offset, config.frame_rate)
        }
        MergePlan::TrimAudio { trim, duration } => {
            log::info!("Trimming audio: skipping first {:.3}s, duration {:.3}s", trim, duration)
        }
    }

    let temp = std::env::temp_dir().join(format!("avsync_{}.mp4", std::process::id()));
    let commands = plan.commands(video, audio, output, &temp, config);
    let result = run_all(&commands);

    if plan.needs_temp_file() {
        let _ = std::fs::remove_file(&temp);
    }
    result?;

    log::info!("Created: {}", output.display());
    if let Ok(meta) = std::fs::metadata(output) {
        log::info!("Size: {:.1} MB", meta.len() as f64 / 1024.0 / 1024.0);
    }
    Ok(())
}

fn run_all(commands: &[Vec<String>]) -> Result<()> {
    for (step, args) in commands.iter().enumerate() {
        log::debug!("ffmpeg {}", args.join(" "));

        let output = Command::new("ffmpeg")
            .args(args)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SyncError::ToolUnavailable("ffmpeg".into()),
                _ => SyncError::Io(e),
            })?;

        if !output.status.success() {
            return Err(SyncError::MergeFailed(format!(
                "step {}/{}: {}",
                step + 1,
                commands.len(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
    }
    Ok(())
}
