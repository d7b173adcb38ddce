//! Lectern audio server library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod ingestion;
pub mod lesson_store;
pub mod server;

// Re-export commonly used types for convenience
pub use ingestion::{FfmpegTranscoder, IngestionPipeline, Transcoder};
pub use lesson_store::{LessonStore, SqliteLessonStore};
pub use server::{run_server, RequestsLoggingLevel};
