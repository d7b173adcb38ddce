use super::state::ServerState;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::debug;

/// Proof that the request carried the configured admin token. Upload and
/// delete handlers take this as their first argument.
#[derive(Debug)]
pub struct AdminSession {
    pub token: String,
}

pub const COOKIE_ADMIN_TOKEN_KEY: &str = "admin_token";
pub const HEADER_ADMIN_TOKEN_KEY: &str = "Authorization";

pub enum SessionExtractionError {
    AccessDenied,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::AccessDenied => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

async fn extract_token_from_cookies(parts: &mut Parts, ctx: &ServerState) -> Option<String> {
    CookieJar::from_request_parts(parts, &ctx)
        .await
        .expect("Could not read cookies into CookieJar.")
        .get(COOKIE_ADMIN_TOKEN_KEY)
        .map(Cookie::value)
        .map(|s| s.to_string())
}

fn extract_token_from_headers(parts: &mut Parts) -> Option<String> {
    parts
        .headers
        .get(HEADER_ADMIN_TOKEN_KEY)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).to_string())
}

async fn extract_admin_session(parts: &mut Parts, ctx: &ServerState) -> Option<AdminSession> {
    // No configured token means no admin surface at all.
    let expected = ctx.config.admin_token.as_deref()?;

    let token = match extract_token_from_cookies(parts, ctx)
        .await
        .or_else(|| extract_token_from_headers(parts))
    {
        None => {
            debug!("No admin token in cookies nor headers.");
            return None;
        }
        Some(x) => x,
    };

    if token != expected {
        debug!("Admin token mismatch.");
        return None;
    }

    Some(AdminSession { token })
}

impl FromRequestParts<ServerState> for AdminSession {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_admin_session(parts, ctx)
            .await
            .ok_or(SessionExtractionError::AccessDenied)
    }
}
