//! Inbound payload model.
//!
//! The host hands the engine whatever body it parsed from the inbound call.
//! The codec decides whether that shape fits the configured content type.

use std::path::PathBuf;

use bytes::Bytes;
use serde_json::Value;

/// Body handed over by the host, or produced by a strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured record (JSON object, array or scalar).
    Json(Value),
    /// Plain string.
    Text(String),
    /// Byte stream.
    Binary(Bytes),
    /// Parsed XML document.
    Xml(XmlDocument),
    /// Named parts of a multipart upload.
    Multipart(MultipartBody),
}

impl Payload {
    /// Short label for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Json(_) => "json",
            Payload::Text(_) => "text",
            Payload::Binary(_) => "binary",
            Payload::Xml(_) => "xml",
            Payload::Multipart(_) => "multipart",
        }
    }

    /// Project the payload into a template context value.
    pub fn to_value(&self) -> Value {
        match self {
            Payload::Json(v) => v.clone(),
            Payload::Text(s) => Value::String(s.clone()),
            Payload::Binary(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
            Payload::Xml(doc) => Value::String(doc.to_xml().to_string()),
            Payload::Multipart(body) => body
                .parts()
                .iter()
                .filter_map(|(name, part)| match part {
                    MultipartPart::Text(text) => Some((name.clone(), Value::String(text.clone()))),
                    MultipartPart::File(file) => file
                        .file_name
                        .clone()
                        .map(|f| (name.clone(), Value::String(f))),
                })
                .collect::<serde_json::Map<_, _>>()
                .into(),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// An XML document held in serialized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    markup: String,
}

impl XmlDocument {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
        }
    }

    /// Serialized document.
    pub fn to_xml(&self) -> &str {
        &self.markup
    }
}

/// A multipart upload: ordered named parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartBody {
    parts: Vec<(String, MultipartPart)>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((name.into(), MultipartPart::Text(value.into())));
        self
    }

    pub fn file(mut self, name: impl Into<String>, file: UploadedFile) -> Self {
        self.parts.push((name.into(), MultipartPart::File(file)));
        self
    }

    pub fn parts(&self) -> &[(String, MultipartPart)] {
        &self.parts
    }
}

/// One multipart field.
#[derive(Debug, Clone, PartialEq)]
pub enum MultipartPart {
    Text(String),
    File(UploadedFile),
}

/// A file received by the host and spooled to a temporary path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Client supplied file name.
    pub file_name: Option<String>,
    /// Where the host stored the upload; `None` when the upload failed.
    pub tmp_path: Option<PathBuf>,
    pub content_type: Option<String>,
}
