use crate::dispatcher::{HandlerRequest, HandlerResponse};
use crate::pipeline::Next;

/// A request-processing unit in a pipeline.
///
/// A middleware receives the request and a [`Next`] handle. It can:
///
/// - pass the (possibly modified) request on with `next.run(req)` and
///   return or post-process the response it gets back
/// - return a response without calling `next`, which ends the pipeline
/// - return an error, which aborts the rest of the chain
///
/// `Next` is consumed by `run`, so the rest of the chain runs at most once.
pub trait Middleware: Send + Sync {
    fn handle(&self, req: HandlerRequest, next: Next<'_>) -> anyhow::Result<HandlerResponse>;

    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Middleware built from a closure, see [`from_fn`]
pub struct FnMiddleware<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a middleware
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnMiddleware<F>
where
    F: Fn(HandlerRequest, Next<'_>) -> anyhow::Result<HandlerResponse> + Send + Sync,
{
    FnMiddleware {
        name: name.into(),
        f,
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(HandlerRequest, Next<'_>) -> anyhow::Result<HandlerResponse> + Send + Sync,
{
    fn handle(&self, req: HandlerRequest, next: Next<'_>) -> anyhow::Result<HandlerResponse> {
        (self.f)(req, next)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
