//! Lesson records as seen by the audio subsystem.

use serde::{Deserialize, Serialize};

/// A lesson row. The audio fields start out null and are populated
/// atomically by a successful ingestion; `processed_path` set implies
/// `duration_seconds` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub title: String,
    /// Relative path of the original upload, e.g. `original/lesson_3.wav`.
    pub original_audio_path: Option<String>,
    /// Relative path of the processed MP3, e.g. `processed/lesson_3.mp3`.
    pub processed_audio_path: Option<String>,
    pub duration_seconds: Option<u64>,
    /// Amplitude envelope, each value in `[1, max_amplitude]`.
    pub waveform: Option<Vec<u32>>,
    /// Sanitized stem of the uploaded filename, kept for display only.
    pub audio_filename: Option<String>,
}

impl Lesson {
    pub fn has_audio(&self) -> bool {
        self.processed_audio_path.is_some()
    }
}

/// Audio fields written back after a successful ingestion.
#[derive(Debug, Clone)]
pub struct AudioAssetUpdate {
    pub original_audio_path: String,
    pub processed_audio_path: String,
    pub duration_seconds: u64,
    pub waveform: Vec<u32>,
    pub audio_filename: String,
}
