//! # Router Module
//!
//! Compiled request matching and URL generation over a
//! [`RouteCollection`](crate::route::RouteCollection).
//!
//! ## Architecture
//!
//! The router works in two phases:
//!
//! 1. **Compilation**: [`DispatchCompiler`] turns every route into an
//!    anchored regex and files it under its HTTP method. Routes without
//!    segments go into an exact-path map; the rest are grouped by their
//!    first literal path segment and split into small regex sets. The
//!    result, [`CompiledDispatch`], is plain serializable data.
//!
//! 2. **Matching**: [`UrlMatcher`] loads a `CompiledDispatch`, checks the
//!    static map and every group whose prefix fits the request path, and
//!    picks the earliest registered route among the hits.
//!
//! Matching returns a [`RoutingResult`]: a match with decoded params, a
//! plain miss (404) or the list of methods that would have matched (405).
//!
//! ## Example
//!
//! ```rust
//! use http::Method;
//! use routeline::config::RouterConfig;
//! use routeline::route::RouteRegistrar;
//! use routeline::router::{Router, UrlParams};
//!
//! # fn main() -> Result<(), routeline::RouterError> {
//! let mut r = RouteRegistrar::new();
//! r.get("users.show", "/users/{id}", "UserController@show")?
//!     .requirement("id", "[0-9]+")?;
//! let router = Router::new(r.into_collection()?, RouterConfig::default())?;
//!
//! let result = router.match_route(&Method::GET, "/users/42");
//! assert_eq!(result.params()["id"], "42");
//!
//! let path = router.generate("users.show", &UrlParams::new().with("id", 42))?;
//! assert_eq!(path, "/users/42");
//! # Ok(())
//! # }
//! ```

mod core;
mod generator;
mod matcher;
mod result;

pub use core::Router;
pub use generator::{generate_for_route, UrlGenerator, UrlParams};
pub use matcher::{
    anchored_regex, CompiledDispatch, DispatchCompiler, DispatchGroup, MethodTable, RouteSlot,
    UrlMatcher,
};
pub use result::{RouteMatch, RoutingResult};
