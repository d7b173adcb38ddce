//! Lesson persistence consumed by the audio subsystem.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{AudioAssetUpdate, Lesson};
pub use schema::{LessonSchema, LESSON_VERSIONED_SCHEMAS};
pub use store::SqliteLessonStore;
pub use trait_def::LessonStore;
