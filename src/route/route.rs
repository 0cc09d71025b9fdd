use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::pattern::{self, CompiledPattern, PatternCompiler};
use crate::error::RouterError;

/// Methods a route may be registered for, in canonical order.
pub const SUPPORTED_METHODS: [Method; 7] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

fn method_rank(method: &Method) -> usize {
    SUPPORTED_METHODS
        .iter()
        .position(|m| m == method)
        .unwrap_or(SUPPORTED_METHODS.len())
}

/// Ordered, duplicate free set of HTTP methods
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodSet(Vec<Method>);

impl MethodSet {
    /// Build a set from method names, rejecting anything outside
    /// [`SUPPORTED_METHODS`].
    pub fn parse<I, S>(methods: I) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Vec::new();
        for raw in methods {
            let upper = raw.as_ref().trim().to_ascii_uppercase();
            let method = Method::from_bytes(upper.as_bytes())
                .ok()
                .filter(|m| SUPPORTED_METHODS.contains(m))
                .ok_or_else(|| {
                    RouterError::configuration(format!(
                        "Unsupported HTTP method '{}'",
                        raw.as_ref()
                    ))
                })?;
            set.push(method);
        }
        if set.is_empty() {
            return Err(RouterError::configuration(
                "A route needs at least one HTTP method",
            ));
        }
        Ok(Self::from_methods(set))
    }

    /// Every supported method
    #[must_use]
    pub fn any() -> Self {
        Self(SUPPORTED_METHODS.to_vec())
    }

    pub(crate) fn from_methods(mut methods: Vec<Method>) -> Self {
        methods.sort_by_key(method_rank);
        methods.dedup();
        Self(methods)
    }

    #[must_use]
    pub fn contains(&self, method: &Method) -> bool {
        self.0.contains(method)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.0.iter()
    }

    /// First method in canonical order
    #[must_use]
    pub fn primary(&self) -> Option<&Method> {
        self.0.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Method names, e.g. `["GET", "POST"]`
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|m| m.as_str().to_string()).collect()
    }
}

impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join("|"))
    }
}

/// Reference to the code that handles a route.
///
/// Pure data, so routes survive a round trip through the route cache; the
/// [`crate::dispatcher::HandlerRegistry`] resolves it to something callable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerRef {
    /// `Class@method`
    Controller { class: String, method: String },
    /// A named free function
    Function { name: String },
}

impl HandlerRef {
    #[must_use]
    pub fn controller(class: impl Into<String>, method: impl Into<String>) -> Self {
        HandlerRef::Controller {
            class: class.into(),
            method: method.into(),
        }
    }

    #[must_use]
    pub fn function(name: impl Into<String>) -> Self {
        HandlerRef::Function { name: name.into() }
    }

    /// Prefix an unqualified controller class with `namespace`.
    #[must_use]
    pub fn qualified(self, namespace: Option<&str>) -> Self {
        match (self, namespace) {
            (HandlerRef::Controller { class, method }, Some(ns))
                if !ns.is_empty() && !class.contains("::") =>
            {
                HandlerRef::Controller {
                    class: format!("{}::{}", ns.trim_end_matches(':'), class),
                    method,
                }
            }
            (handler, _) => handler,
        }
    }

    fn validate(&self) -> Result<(), RouterError> {
        let ok = match self {
            HandlerRef::Controller { class, method } => !class.is_empty() && !method.is_empty(),
            HandlerRef::Function { name } => !name.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(RouterError::configuration(format!(
                "Invalid route handler '{}'",
                self
            )))
        }
    }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerRef::Controller { class, method } => write!(f, "{}@{}", class, method),
            HandlerRef::Function { name } => write!(f, "{}", name),
        }
    }
}

impl FromStr for HandlerRef {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let handler = match s.split_once('@') {
            Some((class, method)) => HandlerRef::controller(class.trim(), method.trim()),
            None => HandlerRef::function(s.trim()),
        };
        handler.validate()?;
        Ok(handler)
    }
}

/// Identifier of a middleware entry: everything before the first `:`.
#[must_use]
pub fn middleware_identifier(entry: &str) -> &str {
    entry.split_once(':').map_or(entry, |(id, _)| id).trim()
}

/// Serialised form of a [`Route`], as stored in the route cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteData {
    pub name: String,
    pub pattern: String,
    pub methods: Vec<String>,
    pub handler: HandlerRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub middleware: Vec<String>,
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    #[serde(default)]
    pub requirements: BTreeMap<String, String>,
}

/// A named mapping from methods + pattern to a handler.
///
/// Routes are assembled through [`crate::route::RouteRegistrar`] and are
/// read-only once they sit in a [`crate::route::RouteCollection`]. The
/// compiled pattern and requirement matchers are derived on construction
/// and never serialised.
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    methods: MethodSet,
    handler: HandlerRef,
    namespace: Option<String>,
    middleware: Vec<String>,
    defaults: BTreeMap<String, String>,
    requirements: BTreeMap<String, String>,
    compiled: CompiledPattern,
    requirement_matchers: BTreeMap<String, Regex>,
}

impl Route {
    /// Create a route. An empty `name` is replaced with one derived from the
    /// pattern and handler.
    pub fn new(
        methods: MethodSet,
        name: &str,
        pattern: &str,
        handler: HandlerRef,
        namespace: Option<&str>,
    ) -> Result<Self, RouterError> {
        if methods.is_empty() {
            return Err(RouterError::configuration(format!(
                "Route '{}' needs at least one HTTP method",
                pattern
            )));
        }
        handler.validate()?;
        let handler = handler.qualified(namespace);
        let compiled = PatternCompiler::compile(pattern, &BTreeMap::new())?;
        let name = if name.trim().is_empty() {
            format!("{}:{}", compiled.pattern, handler)
        } else {
            name.trim().to_string()
        };
        Ok(Self {
            name,
            methods,
            handler,
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            middleware: Vec::new(),
            defaults: BTreeMap::new(),
            requirements: BTreeMap::new(),
            compiled,
            requirement_matchers: BTreeMap::new(),
        })
    }

    /// Rebuild a route from cached data, re-checking every invariant.
    pub fn hydrate(data: RouteData) -> Result<Self, RouterError> {
        let methods = MethodSet::parse(&data.methods)?;
        let mut route = Route::new(
            methods,
            &data.name,
            &data.pattern,
            data.handler,
            None,
        )?;
        route.namespace = data.namespace;
        for entry in data.middleware {
            route.add_middleware(&entry)?;
        }
        for (segment, fragment) in data.requirements {
            route.add_requirement(&segment, &fragment)?;
        }
        route.defaults = data.defaults;
        Ok(route)
    }

    /// Serialisable snapshot of this route
    #[must_use]
    pub fn to_data(&self) -> RouteData {
        RouteData {
            name: self.name.clone(),
            pattern: self.compiled.pattern.clone(),
            methods: self.methods.names(),
            handler: self.handler.clone(),
            namespace: self.namespace.clone(),
            middleware: self.middleware.clone(),
            defaults: self.defaults.clone(),
            requirements: self.requirements.clone(),
        }
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub(crate) fn prefix_name(&mut self, prefix: &str) {
        self.name = format!("{}{}", prefix, self.name);
    }

    /// Attach a middleware entry (`name` or `name:arg1,arg2`).
    pub(crate) fn add_middleware(&mut self, entry: &str) -> Result<(), RouterError> {
        let entry = entry.trim();
        let id = middleware_identifier(entry);
        if id.is_empty() {
            return Err(RouterError::configuration(format!(
                "Empty middleware entry on route '{}'",
                self.name
            )));
        }
        if self
            .middleware
            .iter()
            .any(|existing| middleware_identifier(existing) == id)
        {
            return Err(RouterError::DuplicateMiddleware {
                route: self.name.clone(),
                middleware: id.to_string(),
            });
        }
        self.middleware.push(entry.to_string());
        Ok(())
    }

    /// Constrain `segment` with a regex fragment. Requirements are set once.
    pub(crate) fn add_requirement(
        &mut self,
        segment: &str,
        fragment: &str,
    ) -> Result<(), RouterError> {
        if self.requirements.contains_key(segment) {
            return Err(RouterError::DuplicateRequirement {
                route: self.name.clone(),
                segment: segment.to_string(),
            });
        }
        let mut requirements = self.requirements.clone();
        requirements.insert(segment.to_string(), fragment.to_string());
        let compiled = PatternCompiler::compile(&self.compiled.pattern, &requirements)?;
        let matcher = Regex::new(&format!("^(?:{})$", fragment)).map_err(|e| {
            RouterError::invalid_pattern(&self.compiled.pattern, e.to_string())
        })?;
        self.requirement_matchers
            .insert(segment.to_string(), matcher);
        self.requirements = requirements;
        self.compiled = compiled;
        Ok(())
    }

    pub(crate) fn add_default(&mut self, key: &str, value: String) {
        self.defaults.insert(key.to_string(), value);
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.compiled.pattern
    }

    #[must_use]
    pub fn methods(&self) -> &MethodSet {
        &self.methods
    }

    #[must_use]
    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Raw middleware entries in declaration order
    #[must_use]
    pub fn middleware(&self) -> &[String] {
        &self.middleware
    }

    #[must_use]
    pub fn defaults(&self) -> &BTreeMap<String, String> {
        &self.defaults
    }

    #[must_use]
    pub fn requirements(&self) -> &BTreeMap<String, String> {
        &self.requirements
    }

    #[must_use]
    pub fn compiled(&self) -> &CompiledPattern {
        &self.compiled
    }

    #[must_use]
    pub fn segment_names(&self) -> &[String] {
        &self.compiled.segment_names
    }

    #[must_use]
    pub fn required_segment_names(&self) -> &[String] {
        &self.compiled.required
    }

    #[must_use]
    pub fn optional_segment_names(&self) -> &[String] {
        &self.compiled.optional
    }

    /// Whether `value` satisfies the requirement on `segment` (always true
    /// for unconstrained segments).
    #[must_use]
    pub fn satisfies_requirement(&self, segment: &str, value: &str) -> bool {
        self.requirement_matchers
            .get(segment)
            .map_or(true, |re| re.is_match(value))
    }

    /// Validate a requirement fragment without attaching it
    pub fn check_requirement(&self, segment: &str, fragment: &str) -> Result<(), RouterError> {
        pattern::check_requirement(&self.compiled.pattern, segment, fragment)
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.to_data() == other.to_data()
    }
}

impl Eq for Route {}
