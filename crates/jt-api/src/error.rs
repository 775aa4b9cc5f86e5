use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::{borrow::Cow, future::Future};
use thiserror::Error;
use tracing::error;

use jt_common::db::StoreError;
use jt_common::WorkflowError;

tokio::task_local! {
    static REQUEST_ID: String;
}

fn redact_token(token: &str) -> String {
    if token.contains("://") {
        "[redacted-url]".to_string()
    } else if let Some((base, _)) = token.split_once('?') {
        if base.is_empty() {
            "[redacted-query]".to_string()
        } else {
            format!("{base}?[redacted]")
        }
    } else if token.starts_with('/') || token.contains('\\') {
        "[redacted-path]".to_string()
    } else {
        token.to_string()
    }
}

/// Strip control characters, URLs, paths and query strings from a message
/// before it is returned to a client.
fn sanitize_message(message: &str) -> String {
    const MAX_LEN: usize = 240;

    let cleaned = message
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>();

    let mut cleaned = cleaned
        .split_whitespace()
        .map(redact_token)
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.chars().count() > MAX_LEN {
        cleaned = cleaned.chars().take(MAX_LEN).collect();
        cleaned.push('…');
    }

    if cleaned.trim().is_empty() {
        "unexpected error".to_string()
    } else {
        cleaned
    }
}

pub async fn with_request_id<Fut, T>(request_id: Option<String>, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    match request_id {
        Some(request_id) => REQUEST_ID.scope(request_id, fut).await,
        None => fut.await,
    }
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|value| value.clone()).ok()
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("database error: {0}")]
    Database(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("too many requests: {0}")]
    TooManyRequests(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
    request_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let code = self.code();
        let request_id = current_request_id();

        error!(
            code,
            status = %status,
            request_id = request_id.as_deref().unwrap_or(""),
            error = %self,
            "api_error"
        );

        let body = Json(ErrorResponse {
            error: self.public_message().into_owned(),
            code,
            request_id,
        });

        (status, body).into_response()
    }
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::TooManyRequests(_) => "too_many_requests",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Database(_) => "database_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn public_message(&self) -> Cow<'static, str> {
        match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => Cow::Owned(sanitize_message(msg)),
            ApiError::Unauthorized(_) => Cow::Borrowed("unauthorized"),
            ApiError::Forbidden(_) => Cow::Borrowed("forbidden"),
            ApiError::TooManyRequests(_) => Cow::Borrowed("too many requests"),
            ApiError::ServiceUnavailable(_) => Cow::Borrowed("service unavailable"),
            ApiError::Database(_) | ApiError::Internal(_) => Cow::Borrowed("internal server error"),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        ApiError::Database(value.to_string())
    }
}

/// Workflow failures are client errors carrying the workflow's own message,
/// `Unauthorized` included.
impl From<WorkflowError> for ApiError {
    fn from(value: WorkflowError) -> Self {
        ApiError::BadRequest(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use jt_common::workflow::WorkflowAction;
    use serde_json::Value;

    use super::*;

    async fn body_json(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        (parts.status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn includes_request_id_in_response_body_when_present() {
        let err = ApiError::Internal("boom".into());
        let response = with_request_id(Some("req-123".into()), async { err.into_response() }).await;

        let (parts, body) = response.into_parts();
        assert_eq!(parts.status, StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = body.collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["request_id"], "req-123");
        assert_eq!(json["error"], "internal server error");
    }

    #[tokio::test]
    async fn workflow_errors_render_as_bad_request_messages() {
        let (status, json) = body_json(WorkflowError::Unauthorized { job_id: 1, user_id: 2 }.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Unauthorized");
        assert_eq!(json["code"], "bad_request");

        let (_, json) = body_json(WorkflowError::NotFound { job_id: 9 }.into()).await;
        assert_eq!(json["error"], "User or job not found");

        let storage = WorkflowAction::SaveJob.storage(StoreError::Unavailable("pool closed".into()));
        let (status, json) = body_json(storage.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().starts_with("Failed to save job:"));
    }

    #[tokio::test]
    async fn store_errors_hide_details() {
        let (status, json) = body_json(StoreError::Mapping("bad column".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "internal server error");
    }

    #[test]
    fn sanitizer_redacts_urls_paths_and_queries() {
        let cleaned =
            sanitize_message("failed at postgres://u:p@db/x reading /etc/passwd via ?token=1 and a?b=2");
        assert_eq!(
            cleaned,
            "failed at [redacted-url] reading [redacted-path] via [redacted-query] and a?[redacted]"
        );
    }

    #[test]
    fn sanitizer_strips_control_characters_and_caps_length() {
        assert_eq!(sanitize_message("line one\nline\ttwo"), "line one line two");
        assert_eq!(sanitize_message("\n\r"), "unexpected error");

        let long = "x".repeat(500);
        let cleaned = sanitize_message(&long);
        assert_eq!(cleaned.chars().count(), 241);
        assert!(cleaned.ends_with('…'));
    }
}
