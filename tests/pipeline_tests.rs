use std::sync::{Arc, Mutex};

use http::Method;
use routeline::dispatcher::{HandlerRequest, HandlerResponse};
use routeline::middleware::{from_fn, Middleware};
use routeline::pipeline::{Next, Pipeline, PipelineState};
use serde_json::json;

type Log = Arc<Mutex<Vec<String>>>;

/// Records entry and exit around `next`
struct Recorder {
    label: &'static str,
    log: Log,
}

impl Middleware for Recorder {
    fn handle(&self, req: HandlerRequest, next: Next<'_>) -> anyhow::Result<HandlerResponse> {
        self.log.lock().unwrap().push(format!("{}:before", self.label));
        let res = next.run(req);
        self.log.lock().unwrap().push(format!("{}:after", self.label));
        res
    }

    fn name(&self) -> &str {
        self.label
    }
}

/// Answers without calling `next`
struct Gate {
    log: Log,
}

impl Middleware for Gate {
    fn handle(&self, req: HandlerRequest, _next: Next<'_>) -> anyhow::Result<HandlerResponse> {
        self.log.lock().unwrap().push("gate".to_string());
        if req.get_header("authorization").is_none() {
            return Ok(HandlerResponse::error(401, "Unauthorized"));
        }
        Ok(HandlerResponse::json(200, json!({ "gate": "open" })))
    }

    fn name(&self) -> &str {
        "gate"
    }
}

fn recorder(label: &'static str, log: &Log) -> Arc<dyn Middleware> {
    Arc::new(Recorder {
        label,
        log: Arc::clone(log),
    })
}

fn handler(log: &Log) -> impl Fn(HandlerRequest) -> anyhow::Result<HandlerResponse> + Send + Sync {
    let log = Arc::clone(log);
    move |req: HandlerRequest| {
        log.lock().unwrap().push("handler".to_string());
        Ok(HandlerResponse::json(200, json!({ "path": req.path })))
    }
}

#[test]
fn test_middleware_wraps_handler_in_order() {
    let log: Log = Arc::default();
    let pipeline = Pipeline::new(vec![recorder("a", &log), recorder("b", &log), recorder("c", &log)]);
    assert_eq!(pipeline.names(), vec!["a", "b", "c"]);

    let report = pipeline.run_traced(HandlerRequest::new(Method::GET, "/"), &handler(&log));
    assert_eq!(report.state, PipelineState::TerminalRun);
    assert_eq!(report.entered, 3);
    assert_eq!(report.result.unwrap().status, 200);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["a:before", "b:before", "c:before", "handler", "c:after", "b:after", "a:after"]
    );
}

#[test]
fn test_short_circuit_skips_rest_of_chain() {
    let log: Log = Arc::default();
    let pipeline = Pipeline::new(vec![
        recorder("outer", &log),
        Arc::new(Gate {
            log: Arc::clone(&log),
        }),
        recorder("inner", &log),
    ]);

    let report = pipeline.run_traced(HandlerRequest::new(Method::GET, "/admin"), &handler(&log));
    assert_eq!(report.state, PipelineState::ShortCircuited { index: 1 });
    assert_eq!(report.entered, 2);
    assert_eq!(report.result.unwrap().status, 401);
    assert_eq!(*log.lock().unwrap(), vec!["outer:before", "gate", "outer:after"]);
}

#[test]
fn test_short_circuit_at_every_position() {
    for stop_at in 0..4 {
        let log: Log = Arc::default();
        let mut chain: Vec<Arc<dyn Middleware>> = Vec::new();
        for i in 0..4 {
            if i == stop_at {
                chain.push(Arc::new(Gate {
                    log: Arc::clone(&log),
                }));
            } else {
                chain.push(recorder(["m0", "m1", "m2", "m3"][i], &log));
            }
        }
        let pipeline = Pipeline::new(chain);
        let report = pipeline.run_traced(HandlerRequest::new(Method::GET, "/"), &handler(&log));

        assert_eq!(report.state, PipelineState::ShortCircuited { index: stop_at });
        assert_eq!(report.entered, stop_at + 1);
        let log = log.lock().unwrap();
        assert!(!log.contains(&"handler".to_string()));
        for later in (stop_at + 1)..4 {
            assert!(!log.contains(&format!("m{}:before", later)));
        }
    }
}

#[test]
fn test_error_aborts_chain() {
    let log: Log = Arc::default();
    let failing = from_fn("failing", |_req: HandlerRequest, _next: Next<'_>| {
        anyhow::bail!("upstream unavailable")
    });
    let pipeline = Pipeline::new(vec![recorder("a", &log), Arc::new(failing), recorder("b", &log)]);

    let report = pipeline.run_traced(HandlerRequest::new(Method::GET, "/"), &handler(&log));
    assert_eq!(report.state, PipelineState::Failed { index: 1 });
    let err = report.result.unwrap_err();
    assert_eq!(err.to_string(), "upstream unavailable");
    assert_eq!(*log.lock().unwrap(), vec!["a:before", "a:after"]);
}

#[test]
fn test_middleware_can_modify_request_and_response() {
    let tagger = from_fn("tagger", |mut req: HandlerRequest, next: Next<'_>| {
        req.set_attribute("tenant", json!("acme"));
        let mut res = next.run(req)?;
        res.set_header("x-tenant", "acme".to_string());
        Ok(res)
    });
    let pipeline = Pipeline::new(vec![Arc::new(tagger) as Arc<dyn Middleware>]);
    let terminal = |req: HandlerRequest| -> anyhow::Result<HandlerResponse> {
        Ok(HandlerResponse::json(200, json!({ "tenant": req.attribute("tenant") })))
    };

    let res = pipeline
        .run(HandlerRequest::new(Method::GET, "/"), &terminal)
        .unwrap();
    assert_eq!(res.body["tenant"], "acme");
    assert_eq!(res.get_header("x-tenant"), Some("acme"));
}

#[test]
fn test_execute_one_off_chain() {
    let log: Log = Arc::default();
    let chain = [recorder("only", &log)];
    let res = Pipeline::execute(HandlerRequest::new(Method::POST, "/"), &chain, &handler(&log)).unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(*log.lock().unwrap(), vec!["only:before", "handler", "only:after"]);
}
