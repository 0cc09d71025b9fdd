//! # Dispatcher Module
//!
//! Ties routing to execution. For each request the dispatcher:
//!
//! 1. matches method and path through the [`Router`](crate::router::Router)
//! 2. answers `NoMatch` with 404 and `MethodNotAllowed` with 405 plus an
//!    `allow` header
//! 3. records the route name, handler and path params on the request
//! 4. runs the route's prepared [`Pipeline`](crate::pipeline::Pipeline)
//!    around its handler
//!
//! ## Handler Registration
//!
//! ```rust
//! use std::sync::Arc;
//! use http::Method;
//! use routeline::config::{MiddlewareConfig, RouterConfig};
//! use routeline::dispatcher::{Dispatcher, HandlerRegistry, HandlerRequest, HandlerResponse};
//! use routeline::middleware::{MetricsMiddleware, MiddlewareRegistry, MiddlewareStack};
//! use routeline::route::RouteRegistrar;
//! use routeline::router::Router;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut r = RouteRegistrar::new();
//! r.get("pets.show", "/pets/{id}", "PetController@show")?
//!     .middleware(["request-id"])?;
//! let router = Arc::new(Router::new(r.into_collection()?, RouterConfig::default())?);
//!
//! let mut handlers = HandlerRegistry::new();
//! handlers.register("PetController@show", |req: HandlerRequest| -> anyhow::Result<HandlerResponse> {
//!     Ok(HandlerResponse::json(200, serde_json::json!({ "id": req.get_path_param("id") })))
//! })?;
//!
//! let middleware = MiddlewareRegistry::with_builtins(Arc::new(MetricsMiddleware::new()));
//! let stack = MiddlewareStack::with_registry(MiddlewareConfig::default(), &middleware)?;
//! let dispatcher = Dispatcher::new(router, &stack, &middleware, &handlers)?;
//!
//! let res = dispatcher.dispatch(HandlerRequest::new(Method::GET, "/pets/7"))?;
//! assert_eq!(res.body["id"], "7");
//! # Ok(())
//! # }
//! ```

mod core;
#[allow(clippy::module_inception)]
mod dispatcher;

pub use core::{
    HandlerRequest, HandlerResponse, HeaderVec, ParamVec, RequestId, MAX_INLINE_HEADERS,
    MAX_INLINE_PARAMS,
};
pub use dispatcher::{DispatchOutcome, Dispatcher, HandlerRegistry};
