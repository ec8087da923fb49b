//! Normalized upstream responses.

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, StatusCode};
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::dispatch::codec::decode_body;
use crate::dispatch::rewrite::is_hop_by_hop;
use crate::transport::TransportResponse;

/// Decoded upstream body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    /// Body of a JSON-family content type.
    Json(Value),
    /// Body of a form-urlencoded content type.
    Form(IndexMap<String, String>),
    /// Anything else, passed through untouched.
    Opaque(Bytes),
}

impl ResponseBody {
    /// Structured view used when several bodies are merged.
    pub fn to_value(&self) -> Value {
        match self {
            ResponseBody::Empty => Value::Null,
            ResponseBody::Json(v) => v.clone(),
            ResponseBody::Form(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect::<serde_json::Map<_, _>>()
                .into(),
            ResponseBody::Opaque(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, ResponseBody::Opaque(_))
    }
}

/// The upstream body did not parse under its declared content type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Upstream body is not valid {content_type}: {message}")]
pub struct UpstreamDecodeError {
    pub content_type: String,
    pub message: String,
}

/// Canonical response shape returned by every strategy.
#[derive(Debug, Clone)]
pub struct NormalizedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    /// Set when decoding failed; `body` then holds the raw bytes.
    pub decode_error: Option<UpstreamDecodeError>,
}

impl NormalizedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
            decode_error: None,
        }
    }
}

/// Strip transport headers, decode the body and restore `content-type` for opaque bodies.
pub fn normalize(response: TransportResponse) -> NormalizedResponse {
    let TransportResponse {
        status,
        headers: upstream_headers,
        body,
    } = response;

    let connection_tokens: Vec<HeaderName> = upstream_headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    let mut headers = HeaderMap::with_capacity(upstream_headers.len());
    for (name, value) in &upstream_headers {
        let stripped = is_hop_by_hop(name.as_str())
            || name == CONTENT_LENGTH
            || name == CONTENT_TYPE
            || connection_tokens.contains(name);
        if !stripped {
            headers.append(name.clone(), value.clone());
        }
    }

    let content_type = upstream_headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let (body, decode_error) = decode_body(content_type.as_deref(), body);

    if body.is_opaque() {
        if let Some(original) = upstream_headers.get(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, original.clone());
        }
    }

    if let Some(error) = &decode_error {
        tracing::warn!(status = %status, error = %error, "Upstream body could not be decoded");
    }

    NormalizedResponse {
        status,
        headers,
        body,
        decode_error,
    }
}
