//! Routing subsystem for the host shell.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (priority ordered lookup)
//!     → matcher.rs (segment match, capture `:name` params)
//!     → Return: matched action + path params, or a miss
//!
//! Route Compilation (at load and on reload):
//!     ActionConfig[]
//!     → Parse patterns
//!     → Sort by priority
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at load time, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by priority, then configuration order)

pub mod matcher;
pub mod router;

pub use matcher::{PatternError, RoutePattern};
pub use router::{Route, RouteMatch, RouteMiss, Router};
