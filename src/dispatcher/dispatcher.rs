use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use super::core::{HandlerRequest, HandlerResponse};
use crate::error::RouterError;
use crate::middleware::{Middleware, MiddlewareRef, MiddlewareRegistry, MiddlewareStack};
use crate::pipeline::{Handler, Pipeline, PipelineReport, PipelineState};
use crate::route::{HandlerRef, IntoHandlerRef};
use crate::router::{Router, RoutingResult};

/// Route handler references mapped to executable handlers.
///
/// Routes (and the route cache) only store [`HandlerRef`] identifiers; this
/// registry turns them back into something callable.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerRef, Arc<dyn Handler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.handlers.keys().map(ToString::to_string).collect();
        names.sort();
        f.debug_struct("HandlerRegistry").field("handlers", &names).finish()
    }
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `reference` (`"Controller@method"`, a
    /// function name or a [`HandlerRef`]). References must be fully
    /// qualified, the way routes store them after namespacing.
    pub fn register<R, H>(&mut self, reference: R, handler: H) -> Result<(), RouterError>
    where
        R: IntoHandlerRef,
        H: Handler + 'static,
    {
        let reference = reference.into_handler_ref()?;
        self.handlers.insert(reference, Arc::new(handler));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, reference: &HandlerRef) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(reference)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

struct RouteEntry {
    pipeline: Pipeline,
    handler: Arc<dyn Handler>,
}

/// Matches requests and runs each route's middleware pipeline and handler.
///
/// Everything is resolved in [`Dispatcher::new`]: middleware lists, middleware
/// instances and handlers. A misconfigured route fails construction instead
/// of failing a request.
pub struct Dispatcher {
    router: Arc<Router>,
    routes: HashMap<String, RouteEntry>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(
        router: Arc<Router>,
        stack: &MiddlewareStack,
        middleware: &MiddlewareRegistry,
        handlers: &HandlerRegistry,
    ) -> Result<Self, RouterError> {
        let started = Instant::now();
        let mut instances: HashMap<MiddlewareRef, Arc<dyn Middleware>> = HashMap::new();
        let mut routes = HashMap::with_capacity(router.routes().len());

        for route in router.routes().iter() {
            let handler = handlers.get(route.handler()).cloned().ok_or_else(|| {
                RouterError::configuration(format!(
                    "No handler registered for '{}' (route '{}')",
                    route.handler(),
                    route.name()
                ))
            })?;

            let mut chain = Vec::new();
            for reference in stack.resolve_for_route(route)? {
                let instance = match instances.get(&reference) {
                    Some(existing) => Arc::clone(existing),
                    None => {
                        let created = middleware.instantiate(&reference)?;
                        instances.insert(reference, Arc::clone(&created));
                        created
                    }
                };
                chain.push(instance);
            }

            debug!(
                route_name = %route.name(),
                handler = %route.handler(),
                middleware_count = chain.len(),
                "Route pipeline prepared"
            );
            routes.insert(
                route.name().to_string(),
                RouteEntry {
                    pipeline: Pipeline::new(chain),
                    handler,
                },
            );
        }

        info!(
            routes_count = routes.len(),
            middleware_instances = instances.len(),
            duration_us = started.elapsed().as_micros() as u64,
            "Dispatcher ready"
        );
        Ok(Self { router, routes })
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Middleware names in execution order for a route
    pub fn pipeline_for(&self, route_name: &str) -> Result<&Pipeline, RouterError> {
        self.routes
            .get(route_name)
            .map(|entry| &entry.pipeline)
            .ok_or_else(|| RouterError::RouteNotFound(route_name.to_string()))
    }

    /// Route and run a request. `NoMatch` becomes a 404 response and
    /// `MethodNotAllowed` a 405 with an `allow` header.
    pub fn dispatch(&self, req: HandlerRequest) -> anyhow::Result<HandlerResponse> {
        self.dispatch_traced(req).into_result()
    }

    /// [`Dispatcher::dispatch`] keeping the routing and pipeline outcome
    pub fn dispatch_traced(&self, mut req: HandlerRequest) -> DispatchOutcome {
        match self.router.match_route(&req.method, &req.path) {
            RoutingResult::Matched(route_match) => {
                req.apply_match(&route_match);
                let route_name = route_match.route.name().to_string();
                let report = match self.routes.get(&route_name) {
                    Some(entry) => {
                        debug!(
                            request_id = %req.request_id,
                            route_name = %route_name,
                            handler = %route_match.route.handler(),
                            "Request dispatched to pipeline"
                        );
                        entry.pipeline.run_traced(req, entry.handler.as_ref())
                    }
                    None => {
                        error!(route_name = %route_name, "Matched route has no prepared pipeline");
                        PipelineReport {
                            result: Err(anyhow::anyhow!(
                                "route '{}' has no prepared pipeline",
                                route_name
                            )),
                            state: PipelineState::Failed { index: 0 },
                            entered: 0,
                        }
                    }
                };
                DispatchOutcome::Routed { route_name, report }
            }
            RoutingResult::NoMatch => {
                DispatchOutcome::Unrouted(HandlerResponse::error(404, "Not Found"))
            }
            result @ RoutingResult::MethodNotAllowed(_) => {
                let mut res = HandlerResponse::error(405, "Method Not Allowed");
                if let Some(allow) = result.allow_header() {
                    res.set_header("allow", allow);
                }
                DispatchOutcome::Unrouted(res)
            }
        }
    }
}

/// What [`Dispatcher::dispatch_traced`] did with a request
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A route matched and its pipeline ran
    Routed {
        route_name: String,
        report: PipelineReport,
    },
    /// No route matched; carries the 404 or 405 response
    Unrouted(HandlerResponse),
}

impl DispatchOutcome {
    pub fn into_result(self) -> anyhow::Result<HandlerResponse> {
        match self {
            DispatchOutcome::Routed { report, .. } => report.result,
            DispatchOutcome::Unrouted(res) => Ok(res),
        }
    }

    /// Pipeline state, if a route matched
    #[must_use]
    pub fn state(&self) -> Option<PipelineState> {
        match self {
            DispatchOutcome::Routed { report, .. } => Some(report.state),
            DispatchOutcome::Unrouted(_) => None,
        }
    }
}
