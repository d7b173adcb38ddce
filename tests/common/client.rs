//! HTTP client for end-to-end tests
//!
//! Wraps reqwest and provides methods for every server endpoint. When
//! API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use std::time::Duration;

/// HTTP test client
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Lesson Endpoints
    // ========================================================================

    /// GET /v1/lessons/{id}
    pub async fn get_lesson(&self, id: i64) -> Response {
        self.client
            .get(format!("{}/v1/lessons/{}", self.base_url, id))
            .send()
            .await
            .expect("Get lesson request failed")
    }

    /// GET /v1/lessons/{id}/audio without a Range header
    pub async fn stream_audio(&self, id: i64) -> Response {
        self.client
            .get(format!("{}/v1/lessons/{}/audio", self.base_url, id))
            .send()
            .await
            .expect("Stream request failed")
    }

    /// GET /v1/lessons/{id}/audio with a Range header value
    pub async fn stream_audio_range(&self, id: i64, range: &str) -> Response {
        self.client
            .get(format!("{}/v1/lessons/{}/audio", self.base_url, id))
            .header("Range", range)
            .send()
            .await
            .expect("Range stream request failed")
    }

    // ========================================================================
    // Audio Administration Endpoints
    // ========================================================================

    /// POST /v1/lessons/{id}/audio with the configured admin token
    pub async fn upload_audio(&self, id: i64, filename: &str, bytes: Vec<u8>) -> Response {
        self.upload_audio_with_token(id, filename, bytes, Some(ADMIN_TOKEN))
            .await
    }

    /// POST /v1/lessons/{id}/audio with a custom (or no) token
    pub async fn upload_audio_with_token(
        &self,
        id: i64,
        filename: &str,
        bytes: Vec<u8>,
        token: Option<&str>,
    ) -> Response {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut request = self
            .client
            .post(format!("{}/v1/lessons/{}/audio", self.base_url, id))
            .multipart(form);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request.send().await.expect("Upload request failed")
    }

    /// DELETE /v1/lessons/{id}/audio with the configured admin token
    pub async fn delete_audio(&self, id: i64) -> Response {
        self.delete_audio_with_token(id, Some(ADMIN_TOKEN)).await
    }

    /// DELETE /v1/lessons/{id}/audio with a custom (or no) token
    pub async fn delete_audio_with_token(&self, id: i64, token: Option<&str>) -> Response {
        let mut request = self
            .client
            .delete(format!("{}/v1/lessons/{}/audio", self.base_url, id));
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request.send().await.expect("Delete request failed")
    }
}
