//! Request transformation and dispatch engine.
//!
//! # Data Flow
//! ```text
//! Static configuration
//!     → request_config.rs (RequestConfig, pure builders)
//! InboundRequest + CallContext (context.rs, payload.rs)
//!     → sender.rs (Sender::send)
//!         → rewrite.rs (headers, placeholders, query)
//!         → codec.rs (encode outbound body)
//!         → transport (HttpTransport, optional cache decorator)
//!         → response.rs (strip headers, decode body)
//!     → NormalizedResponse
//! ```
//!
//! # Design Decisions
//! - Strategies share one pipeline through `RequestExtractor`
//! - Every check that can fail before I/O runs before the transport is called
//! - Upstream error statuses are responses, not errors

pub mod codec;
pub mod context;
pub mod error;
pub mod payload;
pub mod request_config;
pub mod response;
pub mod rewrite;
pub mod sender;

pub use context::{AppIdentity, CallContext, HttpRequestContext, InboundRequest, UserIdentity};
pub use error::{DispatchError, DispatchResult};
pub use payload::{MultipartBody, MultipartPart, Payload, UploadedFile, XmlDocument};
pub use request_config::{ContentType, ProtocolVersion, QueryParams, RequestConfig};
pub use response::{NormalizedResponse, ResponseBody, UpstreamDecodeError};
pub use sender::{RequestExtractor, RequestValues, Sender};
