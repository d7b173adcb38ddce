use axum::extract::FromRef;

use crate::ingestion::IngestionPipeline;
use crate::lesson_store::LessonStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedLessonStore = Arc<dyn LessonStore>;
pub type GuardedPipeline = Arc<IngestionPipeline>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub lesson_store: GuardedLessonStore,
    pub pipeline: GuardedPipeline,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedLessonStore {
    fn from_ref(input: &ServerState) -> Self {
        input.lesson_store.clone()
    }
}

impl FromRef<ServerState> for GuardedPipeline {
    fn from_ref(input: &ServerState) -> Self {
        input.pipeline.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
