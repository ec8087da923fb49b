//! Outbound transport capability.
//!
//! # Data Flow
//! ```text
//! Sender (assembled OutboundRequest)
//!     → [cache.rs CachingTransport, when caching is enabled]
//!     → client.rs ReqwestTransport (or any HttpTransport)
//!     → TransportResponse (status, headers, bytes)
//! ```
//!
//! # Design Decisions
//! - The engine only sees `HttpTransport`; sockets, TLS and redirects live behind it
//! - 4xx/5xx responses are `Ok`; only failures to complete the call are errors
//! - Caching is a decorator over the trait, not part of the sender

pub mod cache;
pub mod client;
pub mod clock;
pub mod store;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;
use url::Url;

use crate::dispatch::request_config::ProtocolVersion;

pub use cache::CachingTransport;
pub use client::ReqwestTransport;
pub use clock::{Clock, SystemClock};
pub use store::{CacheStore, CachedResponse, MemoryCacheStore};

/// Fully assembled outbound request.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    /// Resolved URL including the merged query string.
    pub url: Url,
    pub headers: HeaderMap,
    pub body: OutboundBody,
    pub version: Option<ProtocolVersion>,
}

/// Encoded outbound body.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBody {
    Empty,
    Bytes(Bytes),
    Multipart(Vec<OutboundPart>),
}

/// One encoded multipart field.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPart {
    pub name: String,
    pub contents: PartContents,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartContents {
    Text(String),
    File {
        file_name: Option<String>,
        content_type: Option<String>,
        bytes: Bytes,
    },
}

/// Raw upstream response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Why the transport failed to complete a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    Request,
}

/// The call did not produce a response.
#[derive(Debug, Clone, Error)]
#[error("{kind:?} error calling {url}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub url: String,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.into(),
        }
    }
}

/// "Send an HTTP request, get status/headers/body back."
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}
