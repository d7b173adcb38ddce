//! Audio transcoding and duration probing via ffmpeg/ffprobe.
//!
//! The external codec tool sits behind the [`Transcoder`] trait so the
//! pipeline can run against a fake in tests (and the tool itself could be
//! swapped for a linked codec or a remote encoder without touching
//! pipeline logic).

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("ffmpeg failed: {0}")]
    TranscodeFailed(String),

    #[error("ffprobe failed: {0}")]
    ProbeFailed(String),

    #[error("invalid probe output: {0}")]
    InvalidDuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loudness-normalization profile applied to every processed lesson.
///
/// The defaults are the standard speech profile: -23 LUFS integrated,
/// -2 dBTP true peak ceiling, 7 LU loudness range.
#[derive(Debug, Clone)]
pub struct TranscodeSettings {
    /// Target bitrate in kbps for the processed MP3.
    pub bitrate_kbps: u32,
    pub loudnorm_integrated_lufs: i32,
    pub loudnorm_true_peak_dbtp: i32,
    pub loudnorm_range_lu: u32,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            bitrate_kbps: 64,
            loudnorm_integrated_lufs: -23,
            loudnorm_true_peak_dbtp: -2,
            loudnorm_range_lu: 7,
        }
    }
}

impl TranscodeSettings {
    fn loudnorm_filter(&self) -> String {
        format!(
            "loudnorm=I={}:TP={}:LRA={}",
            self.loudnorm_integrated_lufs, self.loudnorm_true_peak_dbtp, self.loudnorm_range_lu
        )
    }
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert `input` into a mono MP3 at the configured bitrate,
    /// optionally loudness-normalized. No partially-written output file
    /// remains in place on failure.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        normalize: bool,
    ) -> Result<(), TranscodeError>;

    /// Container duration of `path` in whole seconds (rounded).
    async fn probe_duration(&self, path: &Path) -> Result<u64, TranscodeError>;
}

pub struct FfmpegTranscoder {
    settings: TranscodeSettings,
}

impl FfmpegTranscoder {
    pub fn new(settings: TranscodeSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        normalize: bool,
    ) -> Result<(), TranscodeError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-i")
            .arg(input)
            .args([
                "-vn", // audio only
                "-ac",
                "1", // mono
                "-b:a",
                &format!("{}k", self.settings.bitrate_kbps),
                "-codec:a",
                "libmp3lame",
            ]);
        if normalize {
            cmd.args(["-af", &self.settings.loudnorm_filter()]);
        }
        cmd.arg("-y").arg(output);

        debug!("Transcoding {:?} -> {:?}", input, output);
        let result = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !result.status.success() {
            // ffmpeg may have left a truncated output behind.
            if let Err(e) = tokio::fs::remove_file(output).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove partial transcode output: {}", e);
                }
            }
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(TranscodeError::TranscodeFailed(stderr.to_string()));
        }

        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<u64, TranscodeError> {
        let result = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(TranscodeError::ProbeFailed(stderr.to_string()));
        }

        let stdout = String::from_utf8_lossy(&result.stdout);
        let seconds: f64 = stdout
            .trim()
            .parse()
            .map_err(|_| TranscodeError::InvalidDuration(stdout.trim().to_string()))?;

        Ok(seconds.round() as u64)
    }
}
