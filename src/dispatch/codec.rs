//! Payload codec.
//!
//! # Responsibilities
//! - Encode the outbound body according to the configured content type
//! - Decode the upstream body according to the upstream's declared content type
//!
//! # Design Decisions
//! - Shape mismatches fail with `InvalidPayload` before any network call
//! - The caller's `content-type` header is never overwritten
//! - Unreadable multipart files are skipped, not fatal

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::HeaderMap;
use indexmap::IndexMap;
use serde_json::Value;

use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::dispatch::payload::{MultipartBody, MultipartPart, Payload};
use crate::dispatch::request_config::ContentType;
use crate::dispatch::response::{ResponseBody, UpstreamDecodeError};
use crate::transport::{OutboundBody, OutboundPart, PartContents};

/// Encode `payload` for the wire, setting `content-type` when the caller has not.
pub async fn encode_payload(
    content_type: ContentType,
    payload: Option<&Payload>,
    headers: &mut HeaderMap,
) -> DispatchResult<OutboundBody> {
    let Some(payload) = payload else {
        return Ok(OutboundBody::Empty);
    };

    let body = match (content_type, payload) {
        (ContentType::Json, Payload::Json(value)) => OutboundBody::Bytes(to_json(value)?),
        (ContentType::Json, Payload::Text(text)) => {
            OutboundBody::Bytes(to_json(&Value::String(text.clone()))?)
        }
        (ContentType::Form, Payload::Json(value)) => OutboundBody::Bytes(encode_form(value)?),
        (ContentType::Multipart, Payload::Multipart(body)) => {
            return Ok(OutboundBody::Multipart(load_parts(body).await));
        }
        (ContentType::Binary, Payload::Binary(bytes)) => OutboundBody::Bytes(bytes.clone()),
        (ContentType::Binary, Payload::Text(text)) => OutboundBody::Bytes(Bytes::from(text.clone())),
        (ContentType::Text, Payload::Text(text)) => OutboundBody::Bytes(Bytes::from(text.clone())),
        (ContentType::Xml, Payload::Xml(doc)) => {
            OutboundBody::Bytes(Bytes::from(doc.to_xml().to_string()))
        }
        (ContentType::Xml, Payload::Text(text)) => OutboundBody::Bytes(Bytes::from(text.clone())),
        (content_type, payload) => {
            return Err(DispatchError::invalid_payload(format!(
                "Provided an invalid request payload: {} payload cannot be sent as {}",
                payload.kind(),
                content_type
            )));
        }
    };

    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.mime()));
    }
    Ok(body)
}

fn to_json(value: &Value) -> DispatchResult<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| DispatchError::invalid_payload(format!("Payload is not serializable: {}", e)))
}

/// Flatten a JSON object into form pairs. Nulls are dropped, nesting is rejected.
pub fn form_pairs(value: &Value) -> DispatchResult<Vec<(String, String)>> {
    let Value::Object(map) = value else {
        return Err(DispatchError::invalid_payload(
            "Form payload must be a key/value structure",
        ));
    };

    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map {
        let value = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(DispatchError::invalid_payload(format!(
                    "Form field '{}' is not a scalar value",
                    key
                )));
            }
        };
        pairs.push((key.clone(), value));
    }
    Ok(pairs)
}

fn encode_form(value: &Value) -> DispatchResult<Bytes> {
    let pairs = form_pairs(value)?;
    serde_urlencoded::to_string(&pairs)
        .map(Bytes::from)
        .map_err(|e| DispatchError::invalid_payload(format!("Form encoding failed: {}", e)))
}

async fn load_parts(body: &MultipartBody) -> Vec<OutboundPart> {
    let mut parts = Vec::with_capacity(body.parts().len());
    for (name, part) in body.parts() {
        let contents = match part {
            MultipartPart::Text(text) => PartContents::Text(text.clone()),
            MultipartPart::File(file) => {
                let Some(path) = file.tmp_path.as_ref() else {
                    continue;
                };
                match tokio::fs::read(path).await {
                    Ok(bytes) => PartContents::File {
                        file_name: file.file_name.clone(),
                        content_type: file.content_type.clone(),
                        bytes: Bytes::from(bytes),
                    },
                    Err(e) => {
                        tracing::debug!(part = %name, path = ?path, error = %e, "Skipping unreadable multipart file");
                        continue;
                    }
                }
            }
        };
        parts.push(OutboundPart {
            name: name.clone(),
            contents,
        });
    }
    parts
}

/// How an upstream body is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
    Opaque,
}

/// True for `application/json`, `text/json` and `+json` suffixed types.
pub fn is_json(content_type: &str) -> bool {
    match content_type.parse::<mime::Mime>() {
        Ok(m) => {
            let family = m.type_() == mime::APPLICATION || m.type_() == mime::TEXT;
            family && (m.subtype() == mime::JSON || m.suffix() == Some(mime::JSON))
        }
        Err(_) => false,
    }
}

/// Classify an upstream `content-type` header.
pub fn classify(content_type: Option<&str>) -> BodyKind {
    match content_type {
        Some(ct) if is_json(ct) => BodyKind::Json,
        Some(ct) if ct.to_ascii_lowercase().contains("application/x-www-form-urlencoded") => {
            BodyKind::Form
        }
        _ => BodyKind::Opaque,
    }
}

/// Decode an upstream body.
///
/// When a JSON body does not parse, the raw bytes are returned as an opaque
/// body together with the decode error.
pub fn decode_body(
    content_type: Option<&str>,
    body: Bytes,
) -> (ResponseBody, Option<UpstreamDecodeError>) {
    if body.is_empty() {
        return (ResponseBody::Empty, None);
    }

    match classify(content_type) {
        BodyKind::Json => match serde_json::from_slice::<Value>(&body) {
            Ok(value) => (ResponseBody::Json(value), None),
            Err(e) => {
                let error = UpstreamDecodeError {
                    content_type: content_type.unwrap_or_default().to_string(),
                    message: e.to_string(),
                };
                (ResponseBody::Opaque(body), Some(error))
            }
        },
        BodyKind::Form => match serde_urlencoded::from_bytes::<Vec<(String, String)>>(&body) {
            Ok(pairs) => (
                ResponseBody::Form(pairs.into_iter().collect::<IndexMap<_, _>>()),
                None,
            ),
            Err(e) => {
                let error = UpstreamDecodeError {
                    content_type: content_type.unwrap_or_default().to_string(),
                    message: e.to_string(),
                };
                (ResponseBody::Opaque(body), Some(error))
            }
        },
        BodyKind::Opaque => (ResponseBody::Opaque(body), None),
    }
}
