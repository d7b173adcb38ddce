//! Lesson audio administration routes: upload and delete.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

use super::metrics::record_ingestion;
use super::session::AdminSession;
use super::state::{GuardedLessonStore, ServerState};
use crate::ingestion::{IngestError, UploadSpool};

const UPLOAD_FIELD_NAME: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub lesson_id: i64,
    pub original_path: String,
    pub processed_path: String,
    pub duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub lesson_id: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// GET /v1/lessons/{id}
pub async fn get_lesson(
    State(lesson_store): State<GuardedLessonStore>,
    Path(id): Path<i64>,
) -> Response {
    match lesson_store.get_lesson(id) {
        Ok(Some(lesson)) => Json(lesson).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// POST /v1/lessons/{id}/audio - multipart upload of a lesson recording.
///
/// The body streams straight into a spool file; nothing is buffered in
/// memory beyond one multipart chunk, and the size cap aborts the
/// transfer as soon as it is crossed.
pub async fn upload_lesson_audio(
    _session: AdminSession,
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Response {
    // Reject before consuming the body when the lesson does not exist.
    match state.lesson_store.get_lesson(id) {
        Ok(Some(_)) => {}
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }

    let started = Instant::now();

    let mut field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(UPLOAD_FIELD_NAME) => break field,
            Ok(Some(_)) => continue,
            Ok(None) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Missing multipart field {:?}", UPLOAD_FIELD_NAME),
                )
            }
            Err(e) => {
                warn!("Failed to read multipart body: {}", e);
                return error_response(StatusCode::BAD_REQUEST, "Malformed multipart body");
            }
        }
    };

    let filename = match field.file_name() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return error_response(StatusCode::BAD_REQUEST, "Upload has no filename"),
    };

    let pipeline = &state.pipeline;
    let mut spool = match UploadSpool::create(
        pipeline.spool_dir(),
        pipeline.settings().max_upload_bytes,
    )
    .await
    {
        Ok(spool) => spool,
        Err(e) => {
            warn!("Failed to create upload spool: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut sniffed = false;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                warn!("Upload transfer for lesson {} aborted: {}", id, e);
                return error_response(StatusCode::BAD_REQUEST, "Upload transfer failed");
            }
        };

        // Sniff the leading bytes; uploads that are recognizably not
        // media are rejected before any transcoding happens. Audio-only
        // MP4 containers identify as video, so video types pass too.
        if !sniffed {
            sniffed = true;
            if let Some(kind) = infer::get(&chunk) {
                let mime = kind.mime_type();
                if !mime.starts_with("audio/") && !mime.starts_with("video/") {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        format!("Upload is not an audio file (detected {})", mime),
                    );
                }
            }
        }

        match spool.write_chunk(&chunk).await {
            Ok(()) => {}
            Err(IngestError::PayloadTooLarge(limit)) => {
                record_ingestion("too_large", started.elapsed());
                return error_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!("Upload exceeds the {} byte limit", limit),
                );
            }
            Err(e) => {
                warn!("Failed to spool upload for lesson {}: {}", id, e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    if let Err(e) = spool.finish().await {
        warn!("Failed to flush upload spool for lesson {}: {}", id, e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match pipeline.ingest(id, &filename, &spool).await {
        Ok(outcome) => {
            record_ingestion("success", started.elapsed());
            Json(UploadResponse {
                lesson_id: id,
                original_path: outcome.original_rel_path,
                processed_path: outcome.processed_rel_path,
                duration_seconds: outcome.duration_seconds,
            })
            .into_response()
        }
        Err(IngestError::LessonNotFound) => {
            record_ingestion("not_found", started.elapsed());
            StatusCode::NOT_FOUND.into_response()
        }
        Err(IngestError::Transcode(e)) => {
            warn!("Ingestion for lesson {} failed in transcode: {}", id, e);
            record_ingestion("transcode_failed", started.elapsed());
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Audio processing failed")
        }
        Err(e) => {
            warn!("Ingestion for lesson {} failed: {}", id, e);
            record_ingestion("error", started.elapsed());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// DELETE /v1/lessons/{id}/audio
pub async fn delete_lesson_audio(
    _session: AdminSession,
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Response {
    match state.pipeline.delete_audio(id).await {
        Ok(()) => {
            info!("Removed audio for lesson {}", id);
            Json(DeleteResponse {
                lesson_id: id,
                message: "Audio deleted".to_string(),
            })
            .into_response()
        }
        Err(IngestError::LessonNotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(IngestError::NoAudio) => {
            error_response(StatusCode::NOT_FOUND, "Lesson has no audio to delete")
        }
        Err(e) => {
            warn!("Failed to delete audio for lesson {}: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
