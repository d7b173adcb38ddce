//! SQLite-backed lesson store.

use super::models::{AudioAssetUpdate, Lesson};
use super::schema::LESSON_VERSIONED_SCHEMAS;
use super::trait_def::LessonStore;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteLessonStore {
    conn: Mutex<Connection>,
}

impl SqliteLessonStore {
    /// Open (or create) the lesson database at `path` and initialize the
    /// schema.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open lesson database at {:?}", path))?;
        Self::with_connection(conn)
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let schema = LESSON_VERSIONED_SCHEMAS.first().unwrap();
        conn.execute_batch(schema.up)
            .context("Failed to initialize lesson schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_lesson(row: &Row) -> rusqlite::Result<Lesson> {
        let waveform_json: Option<String> = row.get("waveform_data")?;
        let waveform = waveform_json.and_then(|json| serde_json::from_str(&json).ok());
        let duration: Option<i64> = row.get("duration_seconds")?;

        Ok(Lesson {
            id: row.get("id")?,
            title: row.get("title")?,
            original_audio_path: row.get("original_audio_path")?,
            processed_audio_path: row.get("processed_audio_path")?,
            duration_seconds: duration.map(|d| d.max(0) as u64),
            waveform,
            audio_filename: row.get("audio_filename")?,
        })
    }
}

impl LessonStore for SqliteLessonStore {
    fn get_lesson(&self, id: i64) -> Result<Option<Lesson>> {
        let conn = self.conn.lock().unwrap();
        let lesson = conn
            .query_row(
                "SELECT id, title, original_audio_path, processed_audio_path,
                        duration_seconds, waveform_data, audio_filename
                 FROM lessons WHERE id = ?1",
                params![id],
                Self::row_to_lesson,
            )
            .optional()?;
        Ok(lesson)
    }

    fn create_lesson(&self, title: &str) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO lessons (title, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![title, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn set_lesson_audio(&self, id: i64, update: &AudioAssetUpdate) -> Result<bool> {
        let waveform_json = serde_json::to_string(&update.waveform)?;
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE lessons SET
                original_audio_path = ?1,
                processed_audio_path = ?2,
                duration_seconds = ?3,
                waveform_data = ?4,
                audio_filename = ?5,
                updated_at = ?6
             WHERE id = ?7",
            params![
                update.original_audio_path,
                update.processed_audio_path,
                update.duration_seconds as i64,
                waveform_json,
                update.audio_filename,
                now,
                id
            ],
        )?;
        Ok(changed > 0)
    }

    fn clear_lesson_audio(&self, id: i64) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE lessons SET
                original_audio_path = NULL,
                processed_audio_path = NULL,
                duration_seconds = NULL,
                waveform_data = NULL,
                audio_filename = NULL,
                updated_at = ?1
             WHERE id = ?2",
            params![now, id],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteLessonStore {
        SqliteLessonStore::in_memory().unwrap()
    }

    fn sample_update() -> AudioAssetUpdate {
        AudioAssetUpdate {
            original_audio_path: "original/lesson_1.wav".to_string(),
            processed_audio_path: "processed/lesson_1.mp3".to_string(),
            duration_seconds: 125,
            waveform: vec![1, 50, 100, 42],
            audio_filename: "intro_lecture".to_string(),
        }
    }

    #[test]
    fn created_lesson_has_no_audio() {
        let store = store();
        let id = store.create_lesson("Intro").unwrap();

        let lesson = store.get_lesson(id).unwrap().unwrap();
        assert_eq!(lesson.title, "Intro");
        assert!(!lesson.has_audio());
        assert!(lesson.original_audio_path.is_none());
        assert!(lesson.duration_seconds.is_none());
        assert!(lesson.waveform.is_none());
    }

    #[test]
    fn missing_lesson_is_none() {
        let store = store();
        assert!(store.get_lesson(999).unwrap().is_none());
    }

    #[test]
    fn set_and_clear_audio_roundtrip() {
        let store = store();
        let id = store.create_lesson("Lecture 12").unwrap();

        assert!(store.set_lesson_audio(id, &sample_update()).unwrap());

        let lesson = store.get_lesson(id).unwrap().unwrap();
        assert!(lesson.has_audio());
        assert_eq!(
            lesson.processed_audio_path.as_deref(),
            Some("processed/lesson_1.mp3")
        );
        assert_eq!(lesson.duration_seconds, Some(125));
        assert_eq!(lesson.waveform, Some(vec![1, 50, 100, 42]));
        assert_eq!(lesson.audio_filename.as_deref(), Some("intro_lecture"));

        assert!(store.clear_lesson_audio(id).unwrap());
        let lesson = store.get_lesson(id).unwrap().unwrap();
        assert!(!lesson.has_audio());
        assert!(lesson.waveform.is_none());
    }

    #[test]
    fn updates_against_missing_lesson_report_false() {
        let store = store();
        assert!(!store.set_lesson_audio(404, &sample_update()).unwrap());
        assert!(!store.clear_lesson_audio(404).unwrap());
    }
}
