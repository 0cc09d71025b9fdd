use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::stack::{MiddlewareRef, MiddlewareResolvable};
use super::{Middleware, MetricsMiddleware, RequestIdMiddleware, ResponseHeaderMiddleware, TracingMiddleware};
use crate::error::RouterError;

/// Builds a middleware instance from its entry arguments
pub type MiddlewareFactory =
    dyn Fn(&[String]) -> anyhow::Result<Arc<dyn Middleware>> + Send + Sync;

/// Concrete middleware identifiers mapped to factories.
///
/// Instances are created once per distinct [`MiddlewareRef`] when a
/// dispatcher is built, never per request.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    factories: BTreeMap<String, Arc<MiddlewareFactory>>,
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("ids", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MiddlewareRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in middleware:
    ///
    /// - `request-id` - [`RequestIdMiddleware`]
    /// - `tracing` - [`TracingMiddleware`]
    /// - `metrics` - `metrics`, sharing one [`MetricsMiddleware`]
    /// - `header` - [`ResponseHeaderMiddleware`], args `name,value`
    #[must_use]
    pub fn with_builtins(metrics: Arc<MetricsMiddleware>) -> Self {
        let mut registry = Self::new();
        registry.register_instance("request-id", Arc::new(RequestIdMiddleware));
        registry.register_instance("tracing", Arc::new(TracingMiddleware));
        registry.register_instance("metrics", metrics);
        registry.register("header", |args| {
            Ok(Arc::new(ResponseHeaderMiddleware::from_args(args)?) as Arc<dyn Middleware>)
        });
        registry
    }

    /// Register a factory; replaces any factory with the same id
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&[String]) -> anyhow::Result<Arc<dyn Middleware>> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
    }

    /// Register a shared instance; it ignores entry arguments
    pub fn register_instance(&mut self, id: impl Into<String>, instance: Arc<dyn Middleware>) {
        self.register(id, move |_args| Ok(Arc::clone(&instance)));
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Create the instance for `reference`
    pub fn instantiate(&self, reference: &MiddlewareRef) -> Result<Arc<dyn Middleware>, RouterError> {
        let factory = self.factories.get(&reference.id).ok_or_else(|| {
            RouterError::configuration(format!(
                "No middleware registered under '{}'",
                reference.id
            ))
        })?;
        factory(&reference.args).map_err(|e| {
            RouterError::configuration(format!(
                "Failed to create middleware '{}': {:#}",
                reference, e
            ))
        })
    }
}

impl MiddlewareResolvable for MiddlewareRegistry {
    fn is_resolvable(&self, id: &str) -> bool {
        self.contains(id)
    }

    fn known_ids(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}
