use std::time::Instant;

use tracing::{field, info, info_span, warn};

use super::Middleware;
use crate::dispatcher::{HandlerRequest, HandlerResponse};
use crate::pipeline::Next;

/// Wraps the rest of the pipeline in a `request` span and logs completion
/// with status and latency.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn handle(&self, req: HandlerRequest, next: Next<'_>) -> anyhow::Result<HandlerResponse> {
        let span = info_span!(
            "request",
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            route = req.route_name.as_deref().unwrap_or(""),
            status = field::Empty,
            latency_ms = field::Empty,
        );
        let _enter = span.enter();
        let start = Instant::now();
        let result = next.run(req);
        let latency_ms = start.elapsed().as_millis() as u64;
        span.record("latency_ms", latency_ms);

        match &result {
            Ok(res) => {
                span.record("status", res.status);
                info!(status = res.status, latency_ms = latency_ms, "Request completed");
            }
            Err(e) => {
                warn!(error = %e, latency_ms = latency_ms, "Request failed");
            }
        }
        result
    }

    fn name(&self) -> &str {
        "tracing"
    }
}
