use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Lectern metrics
const PREFIX: &str = "lectern";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Streaming Metrics
    pub static ref STREAMED_BYTES_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_streamed_bytes_total"),
        "Total audio bytes scheduled for delivery"
    ).expect("Failed to create streamed_bytes_total metric");

    pub static ref STREAM_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_stream_requests_total"), "Audio stream requests by kind"),
        &["kind"]
    ).expect("Failed to create stream_requests_total metric");

    // Ingestion Metrics
    pub static ref INGESTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ingestions_total"), "Upload ingestions by outcome"),
        &["outcome"]
    ).expect("Failed to create ingestions_total metric");

    pub static ref INGESTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_ingestion_duration_seconds"),
            "End-to-end ingestion duration in seconds"
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0])
    ).expect("Failed to create ingestion_duration_seconds metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(STREAMED_BYTES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(STREAM_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(INGESTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(INGESTION_DURATION_SECONDS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record a served stream response; kind is "full" or "range".
pub fn record_stream(kind: &str, bytes: u64) {
    STREAM_REQUESTS_TOTAL.with_label_values(&[kind]).inc();
    STREAMED_BYTES_TOTAL.inc_by(bytes);
}

/// Record an upload ingestion outcome
pub fn record_ingestion(outcome: &str, duration: Duration) {
    INGESTIONS_TOTAL.with_label_values(&[outcome]).inc();
    INGESTION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            tracing::error!("Metrics buffer is not valid UTF-8: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
