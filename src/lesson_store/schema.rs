//! Schema definition for the lesson table.

pub struct LessonSchema {
    pub version: usize,
    pub up: &'static str,
}

pub const LESSON_VERSIONED_SCHEMAS: &[LessonSchema] = &[LessonSchema {
    version: 1,
    up: r#"
            CREATE TABLE IF NOT EXISTS lessons (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                original_audio_path TEXT,
                processed_audio_path TEXT,
                duration_seconds INTEGER,
                waveform_data TEXT,
                audio_filename TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
        "#,
}];
