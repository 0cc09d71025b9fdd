//! # Middleware Module
//!
//! - [`Middleware`] - the request-processing contract used by
//!   [`crate::pipeline::Pipeline`]
//! - [`MiddlewareStack`] - turns route middleware entries into an ordered
//!   list of [`MiddlewareRef`] using aliases, groups and a priority table
//! - [`MiddlewareRegistry`] - maps concrete identifiers to factories
//! - built-ins: [`RequestIdMiddleware`], [`TracingMiddleware`],
//!   [`MetricsMiddleware`], [`ResponseHeaderMiddleware`]

mod core;
mod headers;
mod metrics;
mod registry;
mod request_id;
mod stack;
mod tracing;

pub use core::{from_fn, FnMiddleware, Middleware};
pub use headers::ResponseHeaderMiddleware;
pub use metrics::MetricsMiddleware;
pub use registry::{MiddlewareFactory, MiddlewareRegistry};
pub use request_id::{RequestIdMiddleware, REQUEST_ID_HEADER};
pub use stack::{parse_entry, MiddlewareRef, MiddlewareResolvable, MiddlewareStack};
pub use tracing::TracingMiddleware;
