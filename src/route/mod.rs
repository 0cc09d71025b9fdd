//! # Route Module
//!
//! Route definitions and everything derived from a single route:
//!
//! - [`Route`] - methods, pattern, handler reference, middleware entries,
//!   defaults and per-segment requirements
//! - [`PatternCompiler`] - `/users/{id}/{slug?}` to regex source plus
//!   segment metadata
//! - [`RouteCollection`] - ordered, name-unique registry of routes
//! - [`RouteRegistrar`] - `get`/`post`/.../`group` definition surface
//! - [`loader`] - YAML/TOML/JSON route files
//!
//! Routes are only mutable while they are being defined. Once a
//! [`RouteCollection`] is built they are shared behind `Arc` and never
//! change again.

mod collection;
pub mod loader;
mod pattern;
mod registrar;
#[allow(clippy::module_inception)]
mod route;

pub use collection::RouteCollection;
pub use loader::{load_routes, RouteFile};
pub use pattern::{
    CompiledPattern, PatternCompiler, PatternToken, DEFAULT_SEGMENT_REGEX, ESCAPED_SEGMENT_REGEX,
};
pub use registrar::{GroupAttributes, IntoHandlerRef, PendingRoute, RouteRegistrar};
pub use route::{
    middleware_identifier, HandlerRef, MethodSet, Route, RouteData, SUPPORTED_METHODS,
};
