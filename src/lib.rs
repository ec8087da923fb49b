//! Configuration-driven HTTP dispatch engine.
//!
//! Actions bind inbound routes to outbound calls made by one of four
//! strategies: forward to a single URL, forward to a random URL, merge
//! several calls into one body, or send a fully templated request.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod strategy;
pub mod transport;

pub use config::schema::EngineConfig;
pub use dispatch::{CallContext, DispatchError, DispatchResult, InboundRequest, NormalizedResponse, Sender};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use strategy::Action;
