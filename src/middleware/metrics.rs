use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::Middleware;
use crate::dispatcher::{HandlerRequest, HandlerResponse};
use crate::pipeline::Next;

/// Request counters shared by every route that lists `metrics`.
///
/// All counters are atomics with relaxed ordering: cheap to update and
/// eventually consistent when read.
#[derive(Default)]
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    error_count: AtomicUsize,
    client_error_count: AtomicUsize,
    server_error_count: AtomicUsize,
}

impl MetricsMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that entered this middleware
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Mean time spent in the rest of the pipeline; zero before the first
    /// request
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// Requests where the rest of the pipeline returned an error
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Responses with a 4xx status
    #[must_use]
    pub fn client_error_count(&self) -> usize {
        self.client_error_count.load(Ordering::Relaxed)
    }

    /// Responses with a 5xx status
    #[must_use]
    pub fn server_error_count(&self) -> usize {
        self.server_error_count.load(Ordering::Relaxed)
    }
}

impl Middleware for MetricsMiddleware {
    fn handle(&self, req: HandlerRequest, next: Next<'_>) -> anyhow::Result<HandlerResponse> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let result = next.run(req);
        self.total_latency_ns
            .fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
        match &result {
            Ok(res) if (400..500).contains(&res.status) => {
                self.client_error_count.fetch_add(1, Ordering::Relaxed);
            }
            Ok(res) if res.status >= 500 => {
                self.server_error_count.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {}
            Err(_) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    fn name(&self) -> &str {
        "metrics"
    }
}
