//! Filesystem layout and naming for audio artifacts.
//!
//! Every lesson owns at most one original upload and one processed MP3,
//! both living under the content root:
//!
//! ```text
//! <content_root>/original/lesson_{id}.{ext}
//! <content_root>/processed/lesson_{id}.mp3
//! ```
//!
//! Artifact paths are keyed on the lesson id so two uploads with the same
//! filename can never clobber each other; the sanitized upload filename is
//! kept only as display metadata on the lesson record.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

pub const ORIGINAL_DIR: &str = "original";
pub const PROCESSED_DIR: &str = "processed";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Relative paths (under the content root) for one lesson's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub original_rel: String,
    pub processed_rel: String,
}

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the `original/` and `processed/` directories if missing.
    pub async fn init(&self) -> Result<(), ArtifactError> {
        fs::create_dir_all(self.root.join(ORIGINAL_DIR)).await?;
        fs::create_dir_all(self.root.join(PROCESSED_DIR)).await?;
        Ok(())
    }

    /// Compute the artifact layout for a lesson given the upload's filename.
    ///
    /// The original keeps its extension (`.unknown` when absent); the
    /// processed artifact is always `.mp3`.
    pub fn layout(&self, lesson_id: i64, original_filename: &str) -> ArtifactPaths {
        let ext = Path::new(original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_else(|| ".unknown".to_string());

        ArtifactPaths {
            original_rel: format!("{ORIGINAL_DIR}/lesson_{lesson_id}{ext}"),
            processed_rel: format!("{PROCESSED_DIR}/lesson_{lesson_id}.mp3"),
        }
    }

    /// A scratch target under `processed/` for in-flight transcodes,
    /// renamed into place only after transcode and probe both succeed.
    pub fn scratch_processed_rel(&self) -> String {
        format!("{PROCESSED_DIR}/.tmp-{}.mp3", uuid::Uuid::new_v4())
    }

    /// Resolve a relative artifact path against the content root.
    pub fn absolute(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Copy the spooled upload into place as the original artifact.
    pub async fn save_original(&self, spooled: &Path, rel: &str) -> Result<(), ArtifactError> {
        let target = self.absolute(rel);
        fs::copy(spooled, &target).await?;
        debug!("Saved original artifact at {}", rel);
        Ok(())
    }

    /// Atomically move the scratch processed file into its final place.
    pub async fn promote(&self, scratch_rel: &str, final_rel: &str) -> Result<(), ArtifactError> {
        fs::rename(self.absolute(scratch_rel), self.absolute(final_rel)).await?;
        debug!("Promoted processed artifact to {}", final_rel);
        Ok(())
    }

    /// Delete artifacts by relative path. Missing files are not an error;
    /// any other filesystem failure is surfaced after attempting every path.
    pub async fn delete(&self, rels: &[&str]) -> Result<(), ArtifactError> {
        let mut first_err: Option<std::io::Error> = None;
        for rel in rels {
            match fs::remove_file(self.absolute(rel)).await {
                Ok(()) => debug!("Deleted artifact {}", rel),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to delete artifact {}: {}", rel, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e.into()),
        }
    }

    /// Best-effort cleanup after a failed ingestion job. IO errors are
    /// logged and swallowed so they never mask the failure being reported.
    pub async fn cleanup_job(&self, rels: &[&str]) {
        if let Err(e) = self.delete(rels).await {
            warn!("Artifact cleanup after failed job incomplete: {}", e);
        }
    }
}

/// Reduce an uploaded filename to a safe display stem: alphanumerics,
/// `.`, `_`, `-` and spaces survive, spaces become underscores.
pub fn sanitize_stem(original_filename: &str) -> String {
    let stem = Path::new(original_filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    stem.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}
