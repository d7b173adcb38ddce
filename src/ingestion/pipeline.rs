//! Upload ingestion orchestration.
//!
//! An upload moves through: spool to temp file (size cap enforced
//! mid-stream) -> transcode into a scratch target -> duration probe ->
//! waveform -> save original -> promote processed into place -> delete
//! superseded artifacts -> persist. The scratch target means a failed
//! replacement never destroys a lesson's existing audio; the processed
//! file is swapped in with a rename only after both transcode and probe
//! succeed.

use super::artifacts::{sanitize_stem, ArtifactError, ArtifactPaths, ArtifactStore};
use super::transcoder::{TranscodeError, Transcoder};
use super::waveform::{self, WaveformSettings};
use crate::lesson_store::{AudioAssetUpdate, LessonStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("lesson not found")]
    LessonNotFound,

    #[error("lesson has no audio")]
    NoAudio,

    #[error("upload exceeds the configured limit of {0} bytes")]
    PayloadTooLarge(u64),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct IngestionSettings {
    /// Hard ceiling on upload size, enforced while the body streams in.
    pub max_upload_bytes: u64,
    /// Upper bound on concurrent external transcode processes.
    pub max_concurrent_transcodes: usize,
    /// Loudness-normalize processed audio (off keeps a plain transcode).
    pub loudness_normalization: bool,
    pub waveform: WaveformSettings,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: 200 * 1024 * 1024,
            max_concurrent_transcodes: 2,
            loudness_normalization: true,
            waveform: WaveformSettings::default(),
        }
    }
}

/// Result of a successful ingestion, echoed back to the uploader and
/// persisted on the lesson.
#[derive(Debug)]
pub struct IngestOutcome {
    pub original_rel_path: String,
    pub processed_rel_path: String,
    pub duration_seconds: u64,
    pub waveform: Vec<u32>,
}

/// An upload being streamed to disk. Dropping the spool removes the
/// temp file, so the file never outlives the request on any exit path.
pub struct UploadSpool {
    temp: NamedTempFile,
    file: tokio::fs::File,
    written: u64,
    cap: u64,
}

impl UploadSpool {
    pub async fn create(dir: &Path, cap: u64) -> Result<Self, IngestError> {
        let temp = NamedTempFile::new_in(dir)?;
        let file = tokio::fs::File::from_std(temp.reopen()?);
        Ok(Self {
            temp,
            file,
            written: 0,
            cap,
        })
    }

    /// Append a chunk, failing the moment the running total crosses the
    /// cap. Nothing further is buffered after rejection.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), IngestError> {
        self.written += chunk.len() as u64;
        if self.written > self.cap {
            return Err(IngestError::PayloadTooLarge(self.cap));
        }
        self.file.write_all(chunk).await?;
        Ok(())
    }

    pub async fn finish(&mut self) -> Result<(), IngestError> {
        self.file.flush().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn size(&self) -> u64 {
        self.written
    }
}

pub struct IngestionPipeline {
    artifacts: ArtifactStore,
    transcoder: Arc<dyn Transcoder>,
    lessons: Arc<dyn LessonStore>,
    transcode_slots: Semaphore,
    settings: IngestionSettings,
}

impl IngestionPipeline {
    pub fn new(
        artifacts: ArtifactStore,
        transcoder: Arc<dyn Transcoder>,
        lessons: Arc<dyn LessonStore>,
        settings: IngestionSettings,
    ) -> Self {
        let transcode_slots = Semaphore::new(settings.max_concurrent_transcodes.max(1));
        Self {
            artifacts,
            transcoder,
            lessons,
            transcode_slots,
            settings,
        }
    }

    /// Create the artifact directory layout.
    pub async fn init(&self) -> Result<(), IngestError> {
        self.artifacts.init().await?;
        Ok(())
    }

    pub fn settings(&self) -> &IngestionSettings {
        &self.settings
    }

    /// Directory for upload spool files.
    pub fn spool_dir(&self) -> &Path {
        self.artifacts.root()
    }

    /// Run a spooled upload through transcode, probe, waveform and
    /// persistence. On failure the lesson's previous audio (if any) is
    /// left fully intact.
    pub async fn ingest(
        &self,
        lesson_id: i64,
        original_filename: &str,
        spool: &UploadSpool,
    ) -> Result<IngestOutcome, IngestError> {
        let lesson = self
            .lessons
            .get_lesson(lesson_id)?
            .ok_or(IngestError::LessonNotFound)?;

        let paths = self.artifacts.layout(lesson_id, original_filename);
        let scratch_rel = self.artifacts.scratch_processed_rel();
        let scratch_abs = self.artifacts.absolute(&scratch_rel);

        // The external codec is CPU- and IO-heavy; concurrent uploads
        // queue for a bounded number of transcode slots.
        let duration_seconds = {
            let _permit = self
                .transcode_slots
                .acquire()
                .await
                .expect("transcode semaphore is never closed");

            if let Err(e) = self
                .transcoder
                .transcode(spool.path(), &scratch_abs, self.settings.loudness_normalization)
                .await
            {
                self.artifacts.cleanup_job(&[&scratch_rel]).await;
                return Err(e.into());
            }

            match self.transcoder.probe_duration(&scratch_abs).await {
                Ok(d) => d,
                Err(e) => {
                    self.artifacts.cleanup_job(&[&scratch_rel]).await;
                    return Err(e.into());
                }
            }
        };

        let waveform = self
            .compute_waveform(scratch_abs.clone(), duration_seconds)
            .await;

        // Both conversion steps succeeded; now the new artifacts can
        // replace the old ones.
        if let Err(e) = self
            .artifacts
            .save_original(spool.path(), &paths.original_rel)
            .await
        {
            self.artifacts.cleanup_job(&[&scratch_rel]).await;
            return Err(e.into());
        }
        if let Err(e) = self.artifacts.promote(&scratch_rel, &paths.processed_rel).await {
            self.artifacts
                .cleanup_job(&[&scratch_rel, &paths.original_rel])
                .await;
            return Err(e.into());
        }

        self.delete_superseded(&lesson.original_audio_path, &lesson.processed_audio_path, &paths)
            .await;

        let update = AudioAssetUpdate {
            original_audio_path: paths.original_rel.clone(),
            processed_audio_path: paths.processed_rel.clone(),
            duration_seconds,
            waveform: waveform.clone(),
            audio_filename: sanitize_stem(original_filename),
        };

        if !self.lessons.set_lesson_audio(lesson_id, &update)? {
            // Lesson vanished between lookup and persist.
            self.artifacts
                .cleanup_job(&[&paths.original_rel, &paths.processed_rel])
                .await;
            return Err(IngestError::LessonNotFound);
        }

        info!(
            "Ingested audio for lesson {}: {} ({}s, {} bytes uploaded)",
            lesson_id,
            paths.processed_rel,
            duration_seconds,
            spool.size()
        );

        Ok(IngestOutcome {
            original_rel_path: paths.original_rel,
            processed_rel_path: paths.processed_rel,
            duration_seconds,
            waveform,
        })
    }

    /// Remove the lesson's audio fields and both artifacts.
    ///
    /// The record is cleared before the files go so persisted state never
    /// points at a file that has already been removed.
    pub async fn delete_audio(&self, lesson_id: i64) -> Result<(), IngestError> {
        let lesson = self
            .lessons
            .get_lesson(lesson_id)?
            .ok_or(IngestError::LessonNotFound)?;

        let original = lesson.original_audio_path.clone();
        let processed = lesson.processed_audio_path.clone();
        if original.is_none() && processed.is_none() {
            return Err(IngestError::NoAudio);
        }

        self.lessons.clear_lesson_audio(lesson_id)?;

        let rels: Vec<&str> = [original.as_deref(), processed.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        self.artifacts.delete(&rels).await?;

        info!("Deleted audio for lesson {}", lesson_id);
        Ok(())
    }

    /// Resolve the absolute path of a lesson's processed audio, if any.
    pub fn processed_audio_path(&self, lesson: &crate::lesson_store::Lesson) -> Option<PathBuf> {
        lesson
            .processed_audio_path
            .as_deref()
            .map(|rel| self.artifacts.absolute(rel))
    }

    async fn compute_waveform(&self, processed: PathBuf, duration_seconds: u64) -> Vec<u32> {
        let settings = self.settings.waveform.clone();
        // Decoding is synchronous and CPU-bound; a failure of the blocking
        // task degrades to the same flat envelope as a decode failure.
        let fallback_settings = settings.clone();
        tokio::task::spawn_blocking(move || waveform::extract(&processed, duration_seconds, &settings))
            .await
            .unwrap_or_else(|e| {
                warn!("Waveform task failed: {}", e);
                waveform::extract(Path::new(""), duration_seconds, &fallback_settings)
            })
    }

    /// Best effort removal of artifacts from a previous upload that the
    /// new layout no longer covers (e.g. an original with a different
    /// extension).
    async fn delete_superseded(
        &self,
        prev_original: &Option<String>,
        prev_processed: &Option<String>,
        new: &ArtifactPaths,
    ) {
        let mut stale: Vec<&str> = Vec::new();
        if let Some(rel) = prev_original.as_deref() {
            if rel != new.original_rel {
                stale.push(rel);
            }
        }
        if let Some(rel) = prev_processed.as_deref() {
            if rel != new.processed_rel {
                stale.push(rel);
            }
        }
        if !stale.is_empty() {
            self.artifacts.cleanup_job(&stale).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lesson_store::SqliteLessonStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Stand-in for ffmpeg/ffprobe: writes a marker file instead of
    /// transcoding, with switchable failure modes.
    struct FakeTranscoder {
        fail_transcode: bool,
        fail_probe: bool,
        duration: u64,
        transcodes: AtomicUsize,
    }

    impl FakeTranscoder {
        fn ok(duration: u64) -> Self {
            Self {
                fail_transcode: false,
                fail_probe: false,
                duration,
                transcodes: AtomicUsize::new(0),
            }
        }

        fn failing_transcode() -> Self {
            Self {
                fail_transcode: true,
                ..Self::ok(0)
            }
        }

        fn failing_probe() -> Self {
            Self {
                fail_probe: true,
                ..Self::ok(0)
            }
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn transcode(
            &self,
            input: &Path,
            output: &Path,
            _normalize: bool,
        ) -> Result<(), TranscodeError> {
            self.transcodes.fetch_add(1, Ordering::SeqCst);
            if self.fail_transcode {
                return Err(TranscodeError::TranscodeFailed(
                    "fake codec exploded".to_string(),
                ));
            }
            let input_bytes = tokio::fs::read(input).await?;
            tokio::fs::write(output, [b"PROCESSED:".as_slice(), &input_bytes].concat()).await?;
            Ok(())
        }

        async fn probe_duration(&self, _path: &Path) -> Result<u64, TranscodeError> {
            if self.fail_probe {
                return Err(TranscodeError::ProbeFailed("no duration".to_string()));
            }
            Ok(self.duration)
        }
    }

    struct Fixture {
        _root: TempDir,
        pipeline: IngestionPipeline,
        lessons: Arc<SqliteLessonStore>,
        lesson_id: i64,
        root_path: PathBuf,
    }

    async fn fixture(transcoder: FakeTranscoder) -> Fixture {
        fixture_with_settings(transcoder, IngestionSettings::default()).await
    }

    async fn fixture_with_settings(
        transcoder: FakeTranscoder,
        settings: IngestionSettings,
    ) -> Fixture {
        let root = TempDir::new().unwrap();
        let root_path = root.path().to_path_buf();
        let lessons = Arc::new(SqliteLessonStore::in_memory().unwrap());
        let lesson_id = lessons.create_lesson("Lecture").unwrap();

        let pipeline = IngestionPipeline::new(
            ArtifactStore::new(root.path()),
            Arc::new(transcoder),
            lessons.clone(),
            settings,
        );
        pipeline.init().await.unwrap();

        Fixture {
            _root: root,
            pipeline,
            lessons,
            lesson_id,
            root_path,
        }
    }

    async fn spool_bytes(fx: &Fixture, bytes: &[u8]) -> UploadSpool {
        let mut spool = UploadSpool::create(fx.pipeline.spool_dir(), 1024 * 1024)
            .await
            .unwrap();
        spool.write_chunk(bytes).await.unwrap();
        spool.finish().await.unwrap();
        spool
    }

    #[tokio::test]
    async fn successful_ingestion_persists_paths_and_duration() {
        let fx = fixture(FakeTranscoder::ok(125)).await;
        let spool = spool_bytes(&fx, b"fake wav bytes").await;

        let outcome = fx
            .pipeline
            .ingest(fx.lesson_id, "My Lecture.wav", &spool)
            .await
            .unwrap();

        assert_eq!(
            outcome.original_rel_path,
            format!("original/lesson_{}.wav", fx.lesson_id)
        );
        assert_eq!(
            outcome.processed_rel_path,
            format!("processed/lesson_{}.mp3", fx.lesson_id)
        );
        assert_eq!(outcome.duration_seconds, 125);
        assert!(!outcome.waveform.is_empty());
        assert!(outcome.waveform.iter().all(|&v| (1..=100).contains(&v)));

        // Artifacts on disk.
        let processed = fx.root_path.join(&outcome.processed_rel_path);
        let content = tokio::fs::read(&processed).await.unwrap();
        assert!(content.starts_with(b"PROCESSED:"));
        assert!(fx.root_path.join(&outcome.original_rel_path).exists());

        // Persisted on the lesson.
        let lesson = fx.lessons.get_lesson(fx.lesson_id).unwrap().unwrap();
        assert_eq!(lesson.duration_seconds, Some(125));
        assert_eq!(
            lesson.processed_audio_path.as_deref(),
            Some(outcome.processed_rel_path.as_str())
        );
        assert_eq!(lesson.audio_filename.as_deref(), Some("My_Lecture"));
    }

    #[tokio::test]
    async fn transcode_failure_leaves_no_artifacts() {
        let fx = fixture(FakeTranscoder::failing_transcode()).await;
        let spool = spool_bytes(&fx, b"data").await;

        let err = fx
            .pipeline
            .ingest(fx.lesson_id, "talk.wav", &spool)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Transcode(TranscodeError::TranscodeFailed(_))
        ));

        // processed/ holds nothing for this job, original/ untouched.
        let mut entries = tokio::fs::read_dir(fx.root_path.join("processed"))
            .await
            .unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        let mut entries = tokio::fs::read_dir(fx.root_path.join("original"))
            .await
            .unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());

        let lesson = fx.lessons.get_lesson(fx.lesson_id).unwrap().unwrap();
        assert!(!lesson.has_audio());
    }

    #[tokio::test]
    async fn probe_failure_cleans_scratch_target() {
        let fx = fixture(FakeTranscoder::failing_probe()).await;
        let spool = spool_bytes(&fx, b"data").await;

        let err = fx
            .pipeline
            .ingest(fx.lesson_id, "talk.wav", &spool)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Transcode(TranscodeError::ProbeFailed(_))
        ));

        let mut entries = tokio::fs::read_dir(fx.root_path.join("processed"))
            .await
            .unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_replacement_keeps_previous_audio() {
        let fx = fixture(FakeTranscoder::ok(60)).await;
        let spool = spool_bytes(&fx, b"first upload").await;
        fx.pipeline
            .ingest(fx.lesson_id, "first.wav", &spool)
            .await
            .unwrap();

        // Swap in a failing transcoder for the replacement attempt.
        let failing = IngestionPipeline::new(
            ArtifactStore::new(&fx.root_path),
            Arc::new(FakeTranscoder::failing_transcode()),
            fx.lessons.clone(),
            IngestionSettings::default(),
        );
        let spool = spool_bytes(&fx, b"second upload").await;
        failing
            .ingest(fx.lesson_id, "second.wav", &spool)
            .await
            .unwrap_err();

        // The first upload is fully intact, on disk and in the store.
        let lesson = fx.lessons.get_lesson(fx.lesson_id).unwrap().unwrap();
        assert!(lesson.has_audio());
        assert_eq!(lesson.duration_seconds, Some(60));
        let processed = fx
            .root_path
            .join(lesson.processed_audio_path.as_deref().unwrap());
        let content = tokio::fs::read(processed).await.unwrap();
        assert_eq!(content, b"PROCESSED:first upload");
        assert!(fx
            .root_path
            .join(lesson.original_audio_path.as_deref().unwrap())
            .exists());
    }

    #[tokio::test]
    async fn replacement_removes_superseded_original() {
        let fx = fixture(FakeTranscoder::ok(60)).await;
        let spool = spool_bytes(&fx, b"first").await;
        fx.pipeline
            .ingest(fx.lesson_id, "first.wav", &spool)
            .await
            .unwrap();
        let old_original = fx
            .root_path
            .join(format!("original/lesson_{}.wav", fx.lesson_id));
        assert!(old_original.exists());

        // Re-upload with a different extension; the stale .wav goes away.
        let spool = spool_bytes(&fx, b"second").await;
        let outcome = fx
            .pipeline
            .ingest(fx.lesson_id, "second.flac", &spool)
            .await
            .unwrap();
        assert_eq!(
            outcome.original_rel_path,
            format!("original/lesson_{}.flac", fx.lesson_id)
        );
        assert!(!old_original.exists());
        assert!(fx.root_path.join(&outcome.original_rel_path).exists());
    }

    #[tokio::test]
    async fn ingest_unknown_lesson_is_not_found() {
        let fx = fixture(FakeTranscoder::ok(1)).await;
        let spool = spool_bytes(&fx, b"data").await;
        let err = fx.pipeline.ingest(9999, "x.wav", &spool).await.unwrap_err();
        assert!(matches!(err, IngestError::LessonNotFound));
    }

    #[tokio::test]
    async fn spool_enforces_cap_mid_stream() {
        let dir = TempDir::new().unwrap();
        let mut spool = UploadSpool::create(dir.path(), 100).await.unwrap();

        spool.write_chunk(&[0u8; 60]).await.unwrap();
        let err = spool.write_chunk(&[0u8; 60]).await.unwrap_err();
        assert!(matches!(err, IngestError::PayloadTooLarge(100)));

        let temp_path = spool.path().to_path_buf();
        assert!(temp_path.exists());
        drop(spool);
        // The spool file is gone the moment the upload is rejected.
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn delete_audio_clears_record_and_files() {
        let fx = fixture(FakeTranscoder::ok(30)).await;
        let spool = spool_bytes(&fx, b"bytes").await;
        let outcome = fx
            .pipeline
            .ingest(fx.lesson_id, "talk.wav", &spool)
            .await
            .unwrap();

        fx.pipeline.delete_audio(fx.lesson_id).await.unwrap();

        let lesson = fx.lessons.get_lesson(fx.lesson_id).unwrap().unwrap();
        assert!(!lesson.has_audio());
        assert!(!fx.root_path.join(&outcome.original_rel_path).exists());
        assert!(!fx.root_path.join(&outcome.processed_rel_path).exists());

        // A second delete reports there is nothing to remove.
        let err = fx.pipeline.delete_audio(fx.lesson_id).await.unwrap_err();
        assert!(matches!(err, IngestError::NoAudio));
    }

    #[tokio::test]
    async fn delete_audio_unknown_lesson_is_not_found() {
        let fx = fixture(FakeTranscoder::ok(1)).await;
        let err = fx.pipeline.delete_audio(424242).await.unwrap_err();
        assert!(matches!(err, IngestError::LessonNotFound));
    }
}
