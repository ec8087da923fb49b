//! Inbound request conversion.
//!
//! # Responsibilities
//! - Decode the inbound body by its `content-type` into a `Payload`
//! - Parse the query string
//! - Assemble the `InboundRequest` handed to actions

use axum::http::request::Parts;
use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::Value;

use crate::dispatch::codec::is_json;
use crate::dispatch::context::{HttpRequestContext, InboundRequest};
use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::dispatch::payload::{Payload, XmlDocument};
use crate::dispatch::request_config::QueryParams;

/// Header carrying the per-call correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Decode an inbound body. Empty bodies carry no payload.
///
/// Multipart and unknown types are passed on as raw bytes.
pub fn decode_inbound(content_type: Option<&str>, body: Bytes) -> DispatchResult<Option<Payload>> {
    if body.is_empty() {
        return Ok(None);
    }

    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let payload = if content_type.is_some_and(is_json) {
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| DispatchError::invalid_payload(format!("Request body is not valid JSON: {}", e)))?;
        Payload::Json(value)
    } else if essence == "application/x-www-form-urlencoded" {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&body)
            .map_err(|e| DispatchError::invalid_payload(format!("Request body is not a valid form: {}", e)))?;
        Payload::Json(Value::Object(
            pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect(),
        ))
    } else if essence == "application/xml" || essence == "text/xml" || essence.ends_with("+xml") {
        Payload::Xml(XmlDocument::new(String::from_utf8_lossy(&body).into_owned()))
    } else if essence.starts_with("text/") {
        Payload::Text(String::from_utf8_lossy(&body).into_owned())
    } else {
        Payload::Binary(body)
    };
    Ok(Some(payload))
}

/// Build the engine's view of an inbound HTTP call.
pub fn inbound_request(
    parts: &Parts,
    path_params: IndexMap<String, String>,
    body: Bytes,
) -> DispatchResult<InboundRequest> {
    let content_type = parts
        .headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let payload = decode_inbound(content_type, body)?;
    let query = match parts.uri.query() {
        Some(q) => QueryParams::parse(q).map_err(|e| DispatchError::invalid_payload(e.to_string()))?,
        None => QueryParams::new(),
    };

    let mut http = HttpRequestContext::new(parts.method.clone());
    http.path_params = path_params;
    http.query = query;
    http.headers = parts.headers.clone();

    Ok(InboundRequest {
        http: Some(http),
        arguments: IndexMap::new(),
        payload,
    })
}
