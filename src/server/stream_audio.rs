//! Lesson audio streaming with HTTP range support.
//!
//! Audio always streams from disk in fixed-size chunks; a whole file is
//! never pulled into memory, whatever its size or the requested range.

use super::byte_range::{ByteRange, RawRangeHeader};
use super::metrics::record_stream;
use super::state::ServerState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, SeekFrom},
};
use tokio_util::io::ReaderStream;
use tracing::debug;

const CONTENT_TYPE_MPEG: &str = "audio/mpeg";

pub async fn stream_lesson_audio(
    range_header: RawRangeHeader,
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Response {
    let lesson = match state.lesson_store.get_lesson(id) {
        Ok(Some(lesson)) => lesson,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let path = match state.pipeline.processed_audio_path(&lesson) {
        None => {
            debug!("Lesson {} has no processed audio", id);
            return StatusCode::NOT_FOUND.into_response();
        }
        Some(x) => x,
    };
    debug!("Streaming lesson {} audio from {}", id, path.display());

    let mut file = match File::open(&path).await {
        Ok(x) => x,
        // The record can point at a file that was removed out of band.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return StatusCode::NOT_FOUND.into_response()
        }
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let total = match file.metadata().await {
        Ok(x) => x.len(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let chunk_size = state.config.chunk_size;

    let range = match range_header.0 {
        // No Range header at all: plain 200 with the whole file.
        None => {
            let stream = ReaderStream::with_capacity(file, chunk_size);
            record_stream("full", total);
            return Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", CONTENT_TYPE_MPEG)
                .header("Accept-Ranges", "bytes")
                .header("Content-Length", total)
                .body(Body::from_stream(stream))
                .unwrap();
        }
        // Present but malformed or unsatisfiable: 416 with the total size.
        Some(header) => match ByteRange::parse(&header, total) {
            None => {
                debug!("Unsatisfiable range {:?} for {} bytes", header, total);
                return Response::builder()
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header("Content-Range", format!("bytes */{}", total))
                    .body(Body::empty())
                    .unwrap();
            }
            Some(range) => range,
        },
    };

    if file.seek(SeekFrom::Start(range.start)).await.is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    // `take` bounds the read at the range end; the reader never touches
    // bytes past it.
    let stream = ReaderStream::with_capacity(file.take(range.len()), chunk_size);
    record_stream("range", range.len());

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header("Content-Type", CONTENT_TYPE_MPEG)
        .header("Accept-Ranges", "bytes")
        .header("Content-Range", range.content_range_header())
        .header("Content-Length", range.len())
        .body(Body::from_stream(stream))
        .unwrap()
}
