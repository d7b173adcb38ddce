//! Seeded test data: lessons and on-disk audio artifacts

use super::constants::SEEDED_AUDIO_SIZE;
use lectern_server::ingestion::ArtifactStore;
use lectern_server::lesson_store::{AudioAssetUpdate, LessonStore};
use std::path::Path;
use std::sync::Arc;

/// Deterministic pseudo-audio content so range assertions can compare
/// against exact byte slices.
pub fn seeded_audio_bytes() -> Vec<u8> {
    (0..SEEDED_AUDIO_SIZE).map(|i| (i % 251) as u8).collect()
}

pub struct SeededLessons {
    /// Lesson with processed audio on disk and populated audio fields.
    pub with_audio: i64,
    /// Lesson that exists but has never had an upload.
    pub without_audio: i64,
}

pub fn seed_lessons(store: &Arc<dyn LessonStore>, content_root: &Path) -> SeededLessons {
    let artifacts = ArtifactStore::new(content_root);

    let with_audio = store.create_lesson("Intro to Counterpoint").unwrap();
    let without_audio = store.create_lesson("Figured Bass Basics").unwrap();

    let paths = artifacts.layout(with_audio, "counterpoint.wav");
    std::fs::write(artifacts.absolute(&paths.original_rel), b"original wav bytes").unwrap();
    std::fs::write(artifacts.absolute(&paths.processed_rel), seeded_audio_bytes()).unwrap();

    store
        .set_lesson_audio(
            with_audio,
            &AudioAssetUpdate {
                original_audio_path: paths.original_rel,
                processed_audio_path: paths.processed_rel,
                duration_seconds: 600,
                waveform: vec![50; 2400],
                audio_filename: "counterpoint".to_string(),
            },
        )
        .unwrap();

    SeededLessons {
        with_audio,
        without_audio,
    }
}
