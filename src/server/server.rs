use anyhow::Result;
use std::time::{Duration, Instant};

use tower_http::services::ServeDir;

use axum::{
    extract::{DefaultBodyLimit, State},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;

use super::audio_routes::{delete_lesson_audio, get_lesson, upload_lesson_audio};
use super::metrics::metrics_handler;
use super::state::*;
use super::stream_audio::stream_lesson_audio;
use super::{log_requests, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

pub fn make_app(
    config: ServerConfig,
    lesson_store: GuardedLessonStore,
    pipeline: GuardedPipeline,
) -> Result<Router> {
    // Multipart framing adds overhead on top of the payload itself.
    let body_limit = pipeline.settings().max_upload_bytes as usize + 1024 * 1024;

    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        lesson_store,
        pipeline,
        hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
    };

    let lesson_routes: Router = Router::new()
        .route("/{id}", get(get_lesson))
        .route("/{id}/audio", get(stream_lesson_audio))
        .route("/{id}/audio", post(upload_lesson_audio))
        .route("/{id}/audio", delete(delete_lesson_audio))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let mut app: Router = home_router
        .route("/metrics", get(metrics_handler))
        .nest("/v1/lessons", lesson_routes);

    app = app.layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

pub async fn run_server(
    config: ServerConfig,
    lesson_store: GuardedLessonStore,
    pipeline: GuardedPipeline,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, lesson_store, pipeline)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    Ok(axum::serve(listener, app).await?)
}
