//! # routeline
//!
//! **routeline** is the routing core for a web framework: it matches an HTTP
//! method and path to a named route, generates URLs back from route names,
//! and runs a priority-ordered middleware pipeline around the route handler.
//!
//! ## Architecture
//!
//! - **[`route`]** - route definitions, pattern compilation and the
//!   registrar used to declare routes (in code or from YAML/TOML/JSON)
//! - **[`router`]** - the compiled dispatch structure, the URL matcher, the
//!   URL generator and the [`Router`] facade over them
//! - **[`cache`]** - persistence of compiled routes so later processes skip
//!   compilation
//! - **[`middleware`]** - alias/group/priority resolution and built-in
//!   middleware
//! - **[`pipeline`]** - ordered, short-circuiting middleware execution
//! - **[`dispatcher`]** - request/response types and the glue from a match
//!   to a pipeline run
//! - **[`config`]** and **[`logging`]** - environment-driven configuration
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Dispatcher
//!     participant Router as Router / UrlMatcher
//!     participant Pipeline
//!     participant Handler
//!
//!     Client->>Dispatcher: HandlerRequest GET /users/42
//!     Dispatcher->>Router: match_route(GET, "/users/42")
//!     Router->>Router: static table, then regex groups
//!     alt NoMatch
//!         Dispatcher-->>Client: 404
//!     else MethodNotAllowed
//!         Dispatcher-->>Client: 405 + allow
//!     end
//!     Router-->>Dispatcher: RouteMatch {users.show, id=42}
//!     Dispatcher->>Pipeline: run(req, handler)
//!     Pipeline->>Handler: after every middleware called next
//!     Handler-->>Pipeline: HandlerResponse
//!     Pipeline-->>Client: response, unwound through middleware
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use http::Method;
//! use routeline::config::RouterConfig;
//! use routeline::route::RouteRegistrar;
//! use routeline::{Router, RoutingResult, UrlParams};
//!
//! # fn main() -> Result<(), routeline::RouterError> {
//! let mut routes = RouteRegistrar::new();
//! routes.get("home", "/", "HomeController@index")?;
//! routes
//!     .get("posts.show", "/posts/{slug}/{page?}", "PostController@show")?
//!     .requirement("page", "[0-9]+")?;
//!
//! let router = Router::new(routes.into_collection()?, RouterConfig::default())?;
//!
//! match router.match_route(&Method::GET, "/posts/hello-world/2") {
//!     RoutingResult::Matched(m) => {
//!         assert_eq!(m.route.name(), "posts.show");
//!         assert_eq!(m.param("slug"), Some("hello-world"));
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//!
//! let url = router.generate("posts.show", &UrlParams::new().with("slug", "hello-world"))?;
//! assert_eq!(url, "/posts/hello-world");
//! # Ok(())
//! # }
//! ```
//!
//! ## Route Cache
//!
//! Set `ROUTELINE_ROUTE_CACHE=/path/to/routes.json` and build with
//! [`Router::from_config`]. The first process compiles and writes the
//! cache; later processes load it and never call the definition closure.
//! A missing, corrupt or mismatched cache silently falls back to compiling.

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod pipeline;
pub mod route;
pub mod router;

pub use cache::{FileRouteCache, NullRouteCache, RouteCache};
pub use config::{MiddlewareConfig, RouterConfig, TrailingSlash};
pub use dispatcher::{Dispatcher, HandlerRegistry, HandlerRequest, HandlerResponse};
pub use error::RouterError;
pub use middleware::{Middleware, MiddlewareRegistry, MiddlewareStack};
pub use pipeline::{Handler, Next, Pipeline, PipelineState};
pub use route::{Route, RouteCollection, RouteRegistrar};
pub use router::{RouteMatch, Router, RoutingResult, UrlGenerator, UrlParams};
