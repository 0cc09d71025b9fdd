use super::Middleware;
use crate::dispatcher::{HandlerRequest, HandlerResponse, RequestId};
use crate::pipeline::Next;

/// Header carrying the request id in both directions
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Adopts a valid incoming `x-request-id` (or keeps the generated one) and
/// echoes it on the response.
pub struct RequestIdMiddleware;

impl Middleware for RequestIdMiddleware {
    fn handle(&self, mut req: HandlerRequest, next: Next<'_>) -> anyhow::Result<HandlerResponse> {
        if let Some(id) = req
            .get_header(REQUEST_ID_HEADER)
            .and_then(|v| v.trim().parse::<RequestId>().ok())
        {
            req.request_id = id;
        }
        let id = req.request_id;
        let mut res = next.run(req)?;
        res.set_header(REQUEST_ID_HEADER, id.to_string());
        Ok(res)
    }

    fn name(&self) -> &str {
        "request-id"
    }
}
