use std::cell::RefCell;
use std::sync::Arc;
use std::time::Instant;

use http::Method;
use tracing::{info, warn};
use url::Url;

use super::generator::{UrlGenerator, UrlParams};
use super::matcher::{CompiledDispatch, DispatchCompiler, UrlMatcher};
use super::result::RoutingResult;
use crate::cache::{CompiledRoutes, FileRouteCache, NullRouteCache, RouteCache};
use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::route::{Route, RouteCollection};

/// Routing facade: compiled matcher, URL generator and the route set they
/// were built from.
///
/// A `Router` is read-only once built. Wrap it in `Arc` to share it between
/// workers.
#[derive(Debug, Clone)]
pub struct Router {
    config: RouterConfig,
    routes: Arc<RouteCollection>,
    matcher: Arc<UrlMatcher>,
    generator: UrlGenerator,
}

impl Router {
    /// Compile `routes` directly, without a cache.
    pub fn new(routes: RouteCollection, config: RouterConfig) -> Result<Self, RouterError> {
        let started = Instant::now();
        let dispatch = DispatchCompiler::compile(&routes, &config);
        let router = Self::assemble(Arc::new(routes), dispatch, config)?;
        info!(
            routes_count = router.routes.len(),
            duration_us = started.elapsed().as_micros() as u64,
            "Router built"
        );
        Ok(router)
    }

    /// Build through `cache`. `define` only runs on a cache miss, or when the
    /// cached payload cannot be used with `config`.
    pub fn with_cache<C, F>(cache: &C, config: RouterConfig, define: F) -> Result<Self, RouterError>
    where
        C: RouteCache + ?Sized,
        F: FnOnce() -> Result<RouteCollection, RouterError>,
    {
        let started = Instant::now();
        let define = RefCell::new(Some(define));
        let built: RefCell<Option<Arc<RouteCollection>>> = RefCell::new(None);

        let mut build = || -> Result<CompiledRoutes, RouterError> {
            let define = define
                .borrow_mut()
                .take()
                .ok_or_else(|| RouterError::configuration("route definitions already consumed"))?;
            let routes = define()?;
            let compiled = CompiledRoutes {
                dispatch: DispatchCompiler::compile(&routes, &config),
                routes: routes.to_data(),
            };
            *built.borrow_mut() = Some(Arc::new(routes));
            Ok(compiled)
        };

        let compiled = cache.get(&mut build)?;
        let fresh = built.borrow_mut().take();
        let router = match fresh {
            Some(routes) => Self::assemble(routes, compiled.dispatch, config.clone())?,
            None => match Self::hydrate(compiled, &config) {
                Ok(router) => router,
                Err(e) => {
                    warn!(error = %e, "Cached routes unusable, rebuilding");
                    let compiled = build()?;
                    if let Err(e) = cache.store(&compiled) {
                        warn!(error = %format!("{:#}", e), "Failed to write route cache");
                    }
                    let routes = built.borrow_mut().take().ok_or_else(|| {
                        RouterError::configuration("route rebuild produced no routes")
                    })?;
                    Self::assemble(routes, compiled.dispatch, config.clone())?
                }
            },
        };

        info!(
            routes_count = router.routes.len(),
            duration_us = started.elapsed().as_micros() as u64,
            "Router built"
        );
        Ok(router)
    }

    /// Build with the cache selected by `config.cache_path`.
    pub fn from_config<F>(config: RouterConfig, define: F) -> Result<Self, RouterError>
    where
        F: FnOnce() -> Result<RouteCollection, RouterError>,
    {
        match config.cache_path.clone() {
            Some(path) => Self::with_cache(&FileRouteCache::new(path), config, define),
            None => Self::with_cache(&NullRouteCache, config, define),
        }
    }

    fn hydrate(compiled: CompiledRoutes, config: &RouterConfig) -> Result<Self, RouterError> {
        let dispatch = &compiled.dispatch;
        // The compiler clamps the chunk size the same way.
        let chunk_size = config.chunk_size.max(1);
        if dispatch.trailing_slash != config.trailing_slash || dispatch.chunk_size != chunk_size {
            return Err(RouterError::CacheCorrupt(format!(
                "cache was compiled with trailing_slash={} chunk_size={}, configured trailing_slash={} chunk_size={}",
                dispatch.trailing_slash, dispatch.chunk_size, config.trailing_slash, chunk_size
            )));
        }
        let routes = RouteCollection::hydrate(compiled.routes).map_err(|e| match e {
            RouterError::CacheCorrupt(_) => e,
            other => RouterError::CacheCorrupt(format!("cached route is invalid: {}", other)),
        })?;
        Self::assemble(Arc::new(routes), compiled.dispatch, config.clone())
    }

    fn assemble(
        routes: Arc<RouteCollection>,
        dispatch: CompiledDispatch,
        config: RouterConfig,
    ) -> Result<Self, RouterError> {
        let matcher = UrlMatcher::new(dispatch, &routes)?;
        Ok(Self {
            config,
            generator: UrlGenerator::new(Arc::clone(&routes)),
            routes,
            matcher: Arc::new(matcher),
        })
    }

    /// Base URL for [`Router::generate_absolute`]
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.generator = self.generator.with_base_url(base_url);
        self
    }

    /// Match a request; see [`UrlMatcher::match_route`]
    #[inline]
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> RoutingResult {
        self.matcher.match_route(method, path)
    }

    pub fn generate(&self, name: &str, params: &UrlParams) -> Result<String, RouterError> {
        self.generator.generate(name, params)
    }

    pub fn generate_absolute(&self, name: &str, params: &UrlParams) -> Result<String, RouterError> {
        self.generator.generate_absolute(name, params)
    }

    #[must_use]
    pub fn url_generator(&self) -> &UrlGenerator {
        &self.generator
    }

    #[must_use]
    pub fn routes(&self) -> &RouteCollection {
        &self.routes
    }

    /// Shared handle to the route set
    #[must_use]
    pub fn routes_arc(&self) -> Arc<RouteCollection> {
        Arc::clone(&self.routes)
    }

    pub fn route_by_name(&self, name: &str) -> Result<&Arc<Route>, RouterError> {
        self.routes
            .get(name)
            .ok_or_else(|| RouterError::RouteNotFound(name.to_string()))
    }

    #[must_use]
    pub fn compiled(&self) -> &CompiledDispatch {
        self.matcher.dispatch()
    }

    #[must_use]
    pub fn matcher(&self) -> &UrlMatcher {
        &self.matcher
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route listing, one line per route in registration order
    #[must_use]
    pub fn dump_routes(&self) -> String {
        let rows: Vec<[String; 5]> = self
            .routes
            .iter()
            .map(|r| {
                [
                    r.methods().to_string(),
                    r.pattern().to_string(),
                    r.name().to_string(),
                    r.handler().to_string(),
                    r.middleware().join(", "),
                ]
            })
            .collect();
        let headers = ["METHOD", "PATH", "NAME", "HANDLER", "MIDDLEWARE"];
        let mut widths = headers.map(str::len);
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row.iter()) {
                *w = (*w).max(cell.len());
            }
        }

        let mut out = String::new();
        let mut line = |cells: [&str; 5]| {
            let mut text = String::new();
            for (i, cell) in cells.iter().enumerate() {
                if i + 1 == cells.len() {
                    text.push_str(cell);
                } else {
                    text.push_str(&format!("{:<width$}  ", cell, width = widths[i]));
                }
            }
            out.push_str(text.trim_end());
            out.push('\n');
        };
        line(headers);
        for row in &rows {
            line([&row[0], &row[1], &row[2], &row[3], &row[4]]);
        }
        out
    }
}
