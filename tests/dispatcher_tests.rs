use std::sync::{Arc, Mutex};

use http::Method;
use routeline::config::{MiddlewareConfig, RouterConfig};
use routeline::dispatcher::{DispatchOutcome, Dispatcher, HandlerRegistry, HandlerRequest, HandlerResponse};
use routeline::middleware::{
    from_fn, MetricsMiddleware, Middleware, MiddlewareRegistry, MiddlewareStack,
};
use routeline::pipeline::{Next, PipelineState};
use routeline::route::{GroupAttributes, RouteRegistrar};
use routeline::{Router, RouterError};
use serde_json::json;

type Log = Arc<Mutex<Vec<String>>>;

fn router() -> Arc<Router> {
    let mut r = RouteRegistrar::new();
    r.get("pets.index", "/pets", "PetController@index").unwrap();
    r.post("pets.store", "/pets", "PetController@store")
        .unwrap()
        .middleware(["auth"])
        .unwrap();
    r.get("pets.show", "/pets/{id}", "PetController@show")
        .unwrap()
        .requirement("id", "[0-9]+")
        .unwrap();
    r.group(
        GroupAttributes::new()
            .prefix("/admin")
            .name_prefix("admin.")
            .middleware(["admin"]),
        |r| {
            r.get("stats", "/stats", "AdminController@stats")?
                .middleware(["header:cache-control,no-store"])?;
            Ok(())
        },
    )
    .unwrap();
    r.get("health", "/health", "health").unwrap();
    Arc::new(Router::new(r.into_collection().unwrap(), RouterConfig::default()).unwrap())
}

fn handlers() -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    handlers
        .register("PetController@index", |_req: HandlerRequest| -> anyhow::Result<HandlerResponse> {
            Ok(HandlerResponse::json(200, json!([{ "id": 1 }])))
        })
        .unwrap();
    handlers
        .register("PetController@store", |req: HandlerRequest| -> anyhow::Result<HandlerResponse> {
            Ok(HandlerResponse::json(201, req.body.unwrap_or_default()))
        })
        .unwrap();
    handlers
        .register("PetController@show", |req: HandlerRequest| -> anyhow::Result<HandlerResponse> {
            Ok(HandlerResponse::json(
                200,
                json!({
                    "id": req.get_path_param("id"),
                    "route": req.route_name,
                    "user": req.attribute("user"),
                }),
            ))
        })
        .unwrap();
    handlers
        .register("AdminController@stats", |_req: HandlerRequest| -> anyhow::Result<HandlerResponse> {
            Ok(HandlerResponse::json(200, json!({ "requests": 10 })))
        })
        .unwrap();
    handlers
        .register("health", |_req: HandlerRequest| -> anyhow::Result<HandlerResponse> {
            anyhow::bail!("database unreachable")
        })
        .unwrap();
    handlers
}

fn recording(label: &'static str, log: &Log) -> Arc<dyn Middleware> {
    let log = Arc::clone(log);
    Arc::new(from_fn(label, move |req: HandlerRequest, next: Next<'_>| {
        log.lock().unwrap().push(label.to_string());
        next.run(req)
    }))
}

fn middleware(log: &Log) -> (MiddlewareRegistry, MiddlewareStack) {
    let mut registry = MiddlewareRegistry::with_builtins(Arc::new(MetricsMiddleware::new()));
    let auth_log = Arc::clone(log);
    registry.register_instance(
        "app::Authenticate",
        Arc::new(from_fn("auth", move |mut req: HandlerRequest, next: Next<'_>| {
            auth_log.lock().unwrap().push("auth".to_string());
            match req.get_header("authorization") {
                Some("Bearer secret") => {
                    req.set_attribute("user", json!("alice"));
                    next.run(req)
                }
                _ => Ok(HandlerResponse::error(401, "Unauthorized")),
            }
        })),
    );
    registry.register_instance("app::Audit", recording("audit", log));
    registry.register_instance("app::Admin", recording("admin", log));

    let config = MiddlewareConfig::new()
        .alias("auth", "app::Authenticate")
        .alias("audit", "app::Audit")
        .alias("admin-check", "app::Admin")
        .group("admin", ["auth", "admin-check"])
        .priority(["app::Audit", "app::Authenticate"])
        .global(["audit"]);
    let stack = MiddlewareStack::with_registry(config, &registry).unwrap();
    (registry, stack)
}

fn dispatcher(log: &Log) -> Dispatcher {
    let (registry, stack) = middleware(log);
    Dispatcher::new(router(), &stack, &registry, &handlers()).unwrap()
}

#[test]
fn test_dispatch_runs_handler_with_params() {
    let log: Log = Arc::default();
    let dispatcher = dispatcher(&log);
    let res = dispatcher
        .dispatch(HandlerRequest::new(Method::GET, "/pets/42?verbose=1"))
        .unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(res.body["id"], "42");
    assert_eq!(res.body["route"], "pets.show");
    assert_eq!(*log.lock().unwrap(), vec!["audit"]);
}

#[test]
fn test_unknown_path_is_404() {
    let log: Log = Arc::default();
    let dispatcher = dispatcher(&log);
    let outcome = dispatcher.dispatch_traced(HandlerRequest::new(Method::GET, "/cats"));
    assert!(outcome.state().is_none());
    let res = outcome.into_result().unwrap();
    assert_eq!(res.status, 404);
    assert!(log.lock().unwrap().is_empty(), "no middleware runs without a route");
}

#[test]
fn test_wrong_method_is_405_with_allow_header() {
    let log: Log = Arc::default();
    let dispatcher = dispatcher(&log);
    let res = dispatcher
        .dispatch(HandlerRequest::new(Method::DELETE, "/pets"))
        .unwrap();
    assert_eq!(res.status, 405);
    assert_eq!(res.get_header("Allow"), Some("GET, POST"));
}

#[test]
fn test_auth_short_circuits_before_handler() {
    let log: Log = Arc::default();
    let dispatcher = dispatcher(&log);
    let outcome = dispatcher.dispatch_traced(
        HandlerRequest::new(Method::POST, "/pets").with_body(json!({ "name": "Rex" })),
    );
    match &outcome {
        DispatchOutcome::Routed { route_name, report } => {
            assert_eq!(route_name, "pets.store");
            assert_eq!(report.state, PipelineState::ShortCircuited { index: 1 });
        }
        other => panic!("expected a routed outcome, got {:?}", other),
    }
    assert_eq!(outcome.into_result().unwrap().status, 401);
    assert_eq!(*log.lock().unwrap(), vec!["audit", "auth"]);
}

#[test]
fn test_authenticated_request_reaches_handler() {
    let log: Log = Arc::default();
    let dispatcher = dispatcher(&log);
    let res = dispatcher
        .dispatch(
            HandlerRequest::new(Method::POST, "/pets")
                .with_header("Authorization", "Bearer secret")
                .with_body(json!({ "name": "Rex" })),
        )
        .unwrap();
    assert_eq!(res.status, 201);
    assert_eq!(res.body["name"], "Rex");
}

#[test]
fn test_group_middleware_runs_in_priority_order() {
    let log: Log = Arc::default();
    let dispatcher = dispatcher(&log);
    assert_eq!(
        dispatcher.pipeline_for("admin.stats").unwrap().names(),
        vec!["audit", "auth", "admin", "header"]
    );

    let res = dispatcher
        .dispatch(
            HandlerRequest::new(Method::GET, "/admin/stats")
                .with_header("authorization", "Bearer secret"),
        )
        .unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(res.get_header("cache-control"), Some("no-store"));
    assert_eq!(*log.lock().unwrap(), vec!["audit", "auth", "admin"]);
}

#[test]
fn test_handler_error_is_reported() {
    let log: Log = Arc::default();
    let dispatcher = dispatcher(&log);
    let outcome = dispatcher.dispatch_traced(HandlerRequest::new(Method::GET, "/health"));
    assert_eq!(outcome.state(), Some(PipelineState::Failed { index: 1 }));
    let err = outcome.into_result().unwrap_err();
    assert!(err.to_string().contains("database unreachable"));
}

#[test]
fn test_missing_handler_fails_construction() {
    let log: Log = Arc::default();
    let (registry, stack) = middleware(&log);
    let mut handlers = HandlerRegistry::new();
    handlers
        .register("PetController@index", |_req: HandlerRequest| -> anyhow::Result<HandlerResponse> {
            Ok(HandlerResponse::json(200, json!([])))
        })
        .unwrap();
    let err = Dispatcher::new(router(), &stack, &registry, &handlers).unwrap_err();
    assert!(matches!(err, RouterError::Configuration(_)));
    assert!(err.to_string().contains("PetController@store"), "{}", err);
}

#[test]
fn test_unregistered_middleware_fails_construction() {
    let log: Log = Arc::default();
    let registry = MiddlewareRegistry::new();
    let stack = MiddlewareStack::new(MiddlewareConfig::new(), ["auth", "admin", "header"]).unwrap();
    let err = Dispatcher::new(router(), &stack, &registry, &handlers()).unwrap_err();
    assert!(err.to_string().contains("No middleware registered"), "{}", err);
    assert!(log.lock().unwrap().is_empty());
}
