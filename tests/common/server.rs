//! Test server lifecycle management
//!
//! Each test gets an isolated server on a random port with its own
//! content root, lesson store and a stub transcoder (no ffmpeg needed).

use super::constants::*;
use super::fixtures::{seed_lessons, SeededLessons};
use async_trait::async_trait;
use lectern_server::ingestion::{
    ArtifactStore, IngestionPipeline, IngestionSettings, TranscodeError, Transcoder,
};
use lectern_server::lesson_store::SqliteLessonStore;
use lectern_server::server::state::{GuardedLessonStore, GuardedPipeline};
use lectern_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Stub transcoder for testing - copies bytes instead of invoking ffmpeg
struct StubTranscoder;

#[async_trait]
impl Transcoder for StubTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _normalize: bool,
    ) -> Result<(), TranscodeError> {
        let bytes = tokio::fs::read(input).await?;
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    async fn probe_duration(&self, _path: &Path) -> Result<u64, TranscodeError> {
        Ok(STUB_DURATION_SECONDS)
    }
}

/// Test server instance with isolated content root and lesson store
///
/// When dropped, the server gracefully shuts down and temp resources are
/// cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Lesson store for direct database access in tests
    pub lesson_store: GuardedLessonStore,

    /// Content root holding original/ and processed/ artifacts
    pub content_root: PathBuf,

    /// Ids of the pre-seeded lessons
    pub lessons: SeededLessons,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with default settings
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(IngestionSettings::default()).await
    }

    /// Spawns a test server with a specific upload size cap
    pub async fn spawn_with_upload_cap(max_upload_bytes: u64) -> Self {
        Self::spawn_with_settings(IngestionSettings {
            max_upload_bytes,
            ..IngestionSettings::default()
        })
        .await
    }

    async fn spawn_with_settings(settings: IngestionSettings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let content_root = temp_dir.path().join("content");

        let lesson_store: GuardedLessonStore = Arc::new(
            SqliteLessonStore::new(&temp_dir.path().join("lessons.db"))
                .expect("Failed to open lesson store"),
        );

        let pipeline: GuardedPipeline = Arc::new(IngestionPipeline::new(
            ArtifactStore::new(&content_root),
            Arc::new(StubTranscoder),
            lesson_store.clone(),
            settings,
        ));
        pipeline
            .init()
            .await
            .expect("Failed to create artifact directories");

        let lessons = seed_lessons(&lesson_store, &content_root);

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            frontend_dir_path: None,
            admin_token: Some(ADMIN_TOKEN.to_string()),
            chunk_size: 64 * 1024,
        };

        let app =
            make_app(config, lesson_store.clone(), pipeline).expect("Failed to build app");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            lesson_store,
            content_root,
            lessons,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
