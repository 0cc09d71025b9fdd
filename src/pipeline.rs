//! # Pipeline
//!
//! Runs an ordered list of middleware around a terminal handler.
//!
//! ```text
//! run(req) ─▶ mw[0] ─▶ mw[1] ─▶ ... ─▶ mw[n-1] ─▶ handler
//!                 ◀──────── response flows back ◀──┘
//! ```
//!
//! Each middleware gets a [`Next`] handle for the rest of the chain. Not
//! calling it short-circuits the pipeline: no later middleware runs and the
//! handler is never invoked. Indices are entered strictly in order; the
//! pipeline never skips one.
//!
//! [`Pipeline::run_traced`] additionally reports where execution stopped,
//! which the dispatcher logs and tests assert on.

use std::cell::Cell;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::dispatcher::{HandlerRequest, HandlerResponse};
use crate::middleware::Middleware;

/// The end of a pipeline, usually a route handler
pub trait Handler: Send + Sync {
    fn call(&self, req: HandlerRequest) -> anyhow::Result<HandlerResponse>;
}

impl<F> Handler for F
where
    F: Fn(HandlerRequest) -> anyhow::Result<HandlerResponse> + Send + Sync,
{
    fn call(&self, req: HandlerRequest) -> anyhow::Result<HandlerResponse> {
        self(req)
    }
}

/// How a pipeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Middleware at `index` returned without calling `next`
    ShortCircuited { index: usize },
    /// Every middleware called `next` and the handler ran
    TerminalRun,
    /// An error was raised at `index`; `index == len` means the handler.
    /// Reported even when an outer middleware recovered the error into a
    /// response.
    Failed { index: usize },
}

/// Outcome of [`Pipeline::run_traced`]
#[derive(Debug)]
pub struct PipelineReport {
    pub result: anyhow::Result<HandlerResponse>,
    pub state: PipelineState,
    /// Number of middleware that were entered
    pub entered: usize,
}

#[derive(Debug, Default)]
struct PipelineTrace {
    entered: Cell<usize>,
    terminal_run: Cell<bool>,
    failed_at: Cell<Option<usize>>,
}

impl PipelineTrace {
    fn fail(&self, index: usize) {
        if self.failed_at.get().is_none() {
            self.failed_at.set(Some(index));
        }
    }
}

/// The remainder of a pipeline, handed to each middleware
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    index: usize,
    terminal: &'a dyn Handler,
    trace: &'a PipelineTrace,
}

impl<'a> Next<'a> {
    /// Run the rest of the pipeline
    pub fn run(self, req: HandlerRequest) -> anyhow::Result<HandlerResponse> {
        match self.middleware.split_first() {
            Some((current, rest)) => {
                self.trace.entered.set(self.index + 1);
                debug!(
                    request_id = %req.request_id,
                    middleware_idx = self.index,
                    middleware_name = current.name(),
                    "Middleware entered"
                );
                let next = Next {
                    middleware: rest,
                    index: self.index + 1,
                    terminal: self.terminal,
                    trace: self.trace,
                };
                let result = current.handle(req, next);
                if result.is_err() {
                    self.trace.fail(self.index);
                }
                result
            }
            None => {
                self.trace.terminal_run.set(true);
                let result = self.terminal.call(req);
                if result.is_err() {
                    self.trace.fail(self.index);
                }
                result
            }
        }
    }

    /// Middleware left before the handler
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.middleware.len()
    }
}

/// An ordered middleware chain
#[derive(Clone, Default)]
pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.middleware.iter().map(|m| m.name()))
            .finish()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(middleware: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middleware }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Middleware names in execution order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    /// Run `req` through the chain and `terminal`
    pub fn run(&self, req: HandlerRequest, terminal: &dyn Handler) -> anyhow::Result<HandlerResponse> {
        self.run_traced(req, terminal).result
    }

    /// Run a one-off chain
    pub fn execute(
        req: HandlerRequest,
        middleware: &[Arc<dyn Middleware>],
        terminal: &dyn Handler,
    ) -> anyhow::Result<HandlerResponse> {
        run_chain(req, middleware, terminal).result
    }

    /// Run and report how far execution got
    pub fn run_traced(&self, req: HandlerRequest, terminal: &dyn Handler) -> PipelineReport {
        run_chain(req, &self.middleware, terminal)
    }
}

fn run_chain(
    req: HandlerRequest,
    middleware: &[Arc<dyn Middleware>],
    terminal: &dyn Handler,
) -> PipelineReport {
    let trace = PipelineTrace::default();
    let request_id = req.request_id;
    let next = Next {
        middleware,
        index: 0,
        terminal,
        trace: &trace,
    };
    let result = next.run(req);
    let entered = trace.entered.get();

    let state = match (&result, trace.failed_at.get()) {
        (_, Some(index)) => PipelineState::Failed { index },
        (Err(_), None) => PipelineState::Failed {
            index: entered.saturating_sub(1),
        },
        (Ok(_), None) if trace.terminal_run.get() => PipelineState::TerminalRun,
        (Ok(_), None) => PipelineState::ShortCircuited {
            index: entered.saturating_sub(1),
        },
    };

    match (&state, &result) {
        (PipelineState::Failed { index }, Err(e)) => warn!(
            request_id = %request_id,
            failed_at = index,
            middleware_count = middleware.len(),
            error = %e,
            "Pipeline aborted by error"
        ),
        (PipelineState::Failed { index }, Ok(res)) => warn!(
            request_id = %request_id,
            failed_at = index,
            middleware_count = middleware.len(),
            status = res.status,
            "Pipeline error recovered by outer middleware"
        ),
        (PipelineState::ShortCircuited { index }, _) => debug!(
            request_id = %request_id,
            middleware_idx = index,
            middleware_count = middleware.len(),
            "Middleware returned early response"
        ),
        _ => {}
    }

    PipelineReport {
        result,
        state,
        entered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::from_fn;
    use http::Method;
    use std::sync::Mutex;

    fn ok_handler(_req: HandlerRequest) -> anyhow::Result<HandlerResponse> {
        Ok(HandlerResponse::json(200, serde_json::json!({"ok": true})))
    }

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Arc<dyn Middleware> {
        let log = Arc::clone(log);
        Arc::new(from_fn(name, move |req, next: Next<'_>| {
            log.lock().unwrap().push(format!("{}:before", name));
            let res = next.run(req);
            log.lock().unwrap().push(format!("{}:after", name));
            res
        }))
    }

    #[test]
    fn test_nested_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![recording(&log, "a"), recording(&log, "b")]);
        let report = pipeline.run_traced(HandlerRequest::new(Method::GET, "/"), &ok_handler);
        assert_eq!(report.state, PipelineState::TerminalRun);
        assert_eq!(report.entered, 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:before", "b:before", "b:after", "a:after"]
        );
    }

    #[test]
    fn test_empty_pipeline_runs_handler() {
        let report = Pipeline::default().run_traced(HandlerRequest::new(Method::GET, "/"), &ok_handler);
        assert_eq!(report.state, PipelineState::TerminalRun);
        assert_eq!(report.result.unwrap().status, 200);
    }

    #[test]
    fn test_error_reports_failing_index() {
        let failing: Arc<dyn Middleware> =
            Arc::new(from_fn("boom", |_req, _next: Next<'_>| anyhow::bail!("boom")));
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![recording(&log, "a"), failing, recording(&log, "c")]);
        let report = pipeline.run_traced(HandlerRequest::new(Method::GET, "/"), &ok_handler);
        assert_eq!(report.state, PipelineState::Failed { index: 1 });
        assert!(report.result.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["a:before", "a:after"]);
    }

    #[test]
    fn test_recovered_error_still_reports_failure() {
        let recover: Arc<dyn Middleware> = Arc::new(from_fn("recover", |req, next: Next<'_>| {
            match next.run(req) {
                Ok(res) => Ok(res),
                Err(e) => Ok(HandlerResponse::error(500, &e.to_string())),
            }
        }));
        let failing: Arc<dyn Middleware> =
            Arc::new(from_fn("boom", |_req, _next: Next<'_>| anyhow::bail!("boom")));
        let pipeline = Pipeline::new(vec![recover, failing]);
        let report = pipeline.run_traced(HandlerRequest::new(Method::GET, "/"), &ok_handler);
        assert_eq!(report.state, PipelineState::Failed { index: 1 });
        assert_eq!(report.entered, 2);
        assert_eq!(report.result.unwrap().status, 500);
    }

    #[test]
    fn test_handler_error_index_is_len() {
        let failing_handler =
            |_req: HandlerRequest| -> anyhow::Result<HandlerResponse> { anyhow::bail!("nope") };
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![recording(&log, "a")]);
        let report = pipeline.run_traced(HandlerRequest::new(Method::GET, "/"), &failing_handler);
        assert_eq!(report.state, PipelineState::Failed { index: 1 });
    }
}
