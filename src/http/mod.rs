//! HTTP host shell.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, action lookup)
//!     → request.rs (decode body, parse query, build InboundRequest)
//!     → strategy::Action::handle
//!     → response.rs (render NormalizedResponse or error)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{build_routes, ActionHandle, HttpServer};
