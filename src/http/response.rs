//! Response rendering.
//!
//! # Responsibilities
//! - Serialize a `NormalizedResponse` body for the caller
//! - Map dispatch errors to HTTP status codes
//!
//! # Design Decisions
//! - Errors render as `{"success": false, "message": ...}`
//! - Configuration → 500, InvalidPayload → 400, UpstreamUnavailable → 502

use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::dispatch::error::DispatchError;
use crate::dispatch::response::{NormalizedResponse, ResponseBody};

/// Render a normalized upstream response.
pub fn render(normalized: NormalizedResponse) -> Response {
    let NormalizedResponse {
        status,
        mut headers,
        body,
        ..
    } = normalized;

    let (body, content_type) = match body {
        ResponseBody::Empty => (Body::empty(), None),
        ResponseBody::Json(value) => (Body::from(value.to_string()), Some("application/json")),
        ResponseBody::Form(map) => match serde_urlencoded::to_string(&map) {
            Ok(encoded) => (Body::from(encoded), Some("application/x-www-form-urlencoded")),
            Err(e) => return error_response(&DispatchError::invalid_payload(e.to_string())),
        },
        ResponseBody::Opaque(bytes) => (Body::from(bytes), None),
    };

    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Status code reported to the caller for a dispatch error.
pub fn error_status(error: &DispatchError) -> StatusCode {
    match error {
        DispatchError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        DispatchError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        DispatchError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
    }
}

pub fn error_response(error: &DispatchError) -> Response {
    message_response(error_status(error), &error.to_string())
}

/// JSON failure body with an arbitrary status.
pub fn message_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        json!({"success": false, "message": message}).to_string(),
    )
        .into_response()
}
