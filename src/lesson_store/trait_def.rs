//! LessonStore trait definition.
//!
//! The audio subsystem touches lessons only through this trait: a lookup
//! capability for resolving audio paths and an update capability for
//! persisting ingestion results. Everything else about lessons belongs to
//! the catalog layer.

use super::models::{AudioAssetUpdate, Lesson};
use anyhow::Result;

pub trait LessonStore: Send + Sync {
    /// Fetch a lesson by id.
    fn get_lesson(&self, id: i64) -> Result<Option<Lesson>>;

    /// Create a lesson with no audio. Returns the new id.
    fn create_lesson(&self, title: &str) -> Result<i64>;

    /// Replace the lesson's audio fields wholesale.
    ///
    /// Returns `false` when the lesson does not exist.
    fn set_lesson_audio(&self, id: i64, update: &AudioAssetUpdate) -> Result<bool>;

    /// Null out every audio field on the lesson.
    ///
    /// Returns `false` when the lesson does not exist.
    fn clear_lesson_audio(&self, id: i64) -> Result<bool>;
}
