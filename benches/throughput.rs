use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use routeline::cache::{decode_cache, encode_cache, CompiledRoutes};
use routeline::config::{MiddlewareConfig, RouterConfig};
use routeline::dispatcher::{Dispatcher, HandlerRegistry, HandlerRequest, HandlerResponse};
use routeline::middleware::{MetricsMiddleware, MiddlewareRegistry, MiddlewareStack};
use routeline::route::loader::parse_routes_yaml;
use routeline::route::{RouteCollection, RouteRegistrar};
use routeline::router::DispatchCompiler;
use routeline::{Router, UrlParams};

fn example_routes() -> &'static str {
    r#"
routes:
  - { name: root, path: /, handler: root_handler }
  - { name: animals.index, path: /zoo/animals, handler: get_animals }
  - { name: animals.store, methods: [POST], path: /zoo/animals, handler: create_animal }
  - { name: animals.show, path: "/zoo/animals/{id}", handler: get_animal }
  - { name: animals.update, methods: [PUT, PATCH], path: "/zoo/animals/{id}", handler: update_animal }
  - { name: animals.destroy, methods: [DELETE], path: "/zoo/animals/{id}", handler: delete_animal }
  - { name: animals.toy, path: "/zoo/animals/{id}/toys/{toy_id}", handler: animal_toy }
  - name: habitat.section
    path: "/zoo/{category}/animals/{id}/habitats/{habitat_id}/sections/{section_id}"
    handler: habitat_section
  - name: inventory.batch
    methods: [POST]
    path: "/inventory/{warehouse_id}/feeds/{feed_id}/items/{item_id}/batches/{batch_id}"
    handler: post_item_batch
  - { name: complex, path: "/complex/{a}/{b}/{c}/{d}/{e}/{f}/{g}/{h}/{i}", handler: complex_many_params }
  - { name: health, methods: [HEAD, OPTIONS], path: /zoo/health, handler: health_check }
"#
}

fn example_collection() -> RouteCollection {
    parse_routes_yaml(example_routes()).expect("failed to parse route file")
}

/// Many routes sharing few prefixes, to exercise group chunking
fn large_collection(count: usize) -> RouteCollection {
    let mut r = RouteRegistrar::new();
    for i in 0..count {
        r.get(
            &format!("r{}", i),
            &format!("/api/v{}/resource{}/{{id}}", i % 4, i),
            "ResourceController@show",
        )
        .expect("valid route");
    }
    r.into_collection().expect("unique names")
}

fn bench_route_throughput(c: &mut Criterion) {
    let router = Router::new(example_collection(), RouterConfig::default()).expect("router");
    c.bench_function("route_match", |b| {
        let test_paths = [
            (Method::GET, "/zoo/animals/123"),
            (Method::GET, "/zoo/animals/123/toys/456"),
            (Method::GET, "/zoo/cats/animals/123/habitats/88/sections/5"),
            (Method::POST, "/inventory/1/feeds/2/items/3/batches/4"),
            (Method::GET, "/complex/1/2/3/4/5/6/7/8/9"),
        ];
        b.iter(|| {
            for (method, path) in test_paths.iter() {
                let res = router.match_route(method, path);
                black_box(&res);
            }
        })
    });
}

fn bench_large_table(c: &mut Criterion) {
    let router = Router::new(large_collection(1000), RouterConfig::default()).expect("router");
    c.bench_function("route_match_1000_routes", |b| {
        b.iter(|| {
            let res = router.match_route(&Method::GET, black_box("/api/v3/resource999/42"));
            black_box(&res);
        })
    });
    c.bench_function("route_miss_1000_routes", |b| {
        b.iter(|| {
            let res = router.match_route(&Method::GET, black_box("/api/v3/unknown/42"));
            black_box(&res);
        })
    });
}

fn bench_compile_and_cache(c: &mut Criterion) {
    let collection = large_collection(1000);
    let config = RouterConfig::default();
    c.bench_function("compile_1000_routes", |b| {
        b.iter(|| black_box(DispatchCompiler::compile(&collection, &config)))
    });

    let compiled = CompiledRoutes {
        dispatch: DispatchCompiler::compile(&collection, &config),
        routes: collection.to_data(),
    };
    let bytes = encode_cache(&compiled).expect("encode");
    c.bench_function("load_cache_1000_routes", |b| {
        b.iter(|| {
            let decoded = decode_cache(black_box(&bytes)).expect("decode");
            let routes = RouteCollection::hydrate(decoded.routes).expect("hydrate");
            black_box(routes.len())
        })
    });
}

fn bench_generate(c: &mut Criterion) {
    let router = Router::new(example_collection(), RouterConfig::default()).expect("router");
    let params = UrlParams::new()
        .with("category", "cats")
        .with("id", 123)
        .with("habitat_id", 88)
        .with("section_id", 5);
    c.bench_function("generate_url", |b| {
        b.iter(|| black_box(router.generate("habitat.section", &params)))
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let router = Arc::new(Router::new(example_collection(), RouterConfig::default()).expect("router"));
    let mut handlers = HandlerRegistry::new();
    for route in router.routes().iter() {
        handlers
            .register(route.handler().clone(), |_req: HandlerRequest| -> anyhow::Result<HandlerResponse> {
                Ok(HandlerResponse::json(200, serde_json::Value::Null))
            })
            .expect("handler");
    }
    let middleware = MiddlewareRegistry::with_builtins(Arc::new(MetricsMiddleware::new()));
    let stack = MiddlewareStack::with_registry(
        MiddlewareConfig::new().global(["request-id", "metrics"]),
        &middleware,
    )
    .expect("stack");
    let dispatcher = Dispatcher::new(router, &stack, &middleware, &handlers).expect("dispatcher");

    c.bench_function("dispatch_with_middleware", |b| {
        b.iter(|| {
            let res = dispatcher.dispatch(HandlerRequest::new(Method::GET, "/zoo/animals/123/toys/456"));
            black_box(res.map(|r| r.status).ok())
        })
    });
}

criterion_group!(
    benches,
    bench_route_throughput,
    bench_large_table,
    bench_compile_and_cache,
    bench_generate,
    bench_dispatch
);
criterion_main!(benches);
