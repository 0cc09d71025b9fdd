//! Compiled dispatch structure and the matcher that runs against it.
//!
//! ## Layout
//!
//! [`CompiledDispatch`] is plain data, so it can be written to and read
//! back from the route cache without re-running the pattern compiler:
//!
//! ```text
//! methods
//! └── "GET"
//!     ├── statics: "/health" -> (index 0, "health")
//!     └── groups (one per static prefix, split into chunks)
//!         ├── prefix "/users": [^/users/(?P<id>(?:[0-9]+|[^/]*%[^/]*))/?$, ...] -> [users.show, ...]
//!         └── prefix "":       [^/(?P<slug>[^/]+?)/?$]          -> [pages.show]
//! ```
//!
//! Grouping by static prefix keeps every regex set small: a request only
//! runs the groups whose prefix it starts with, and a chunk never holds more
//! than `chunk_size` alternatives.
//!
//! ## Precedence
//!
//! Every route carries its registration index. When several routes match,
//! the lowest index wins regardless of whether it is static or dynamic, so
//! routes registered earlier take precedence.
//!
//! ## Requirements
//!
//! Requirements apply to decoded segment values, the same values the URL
//! generator checks. The dispatch regex also lets percent-escaped segments
//! through; their decoded value is checked afterwards and a failing
//! candidate falls through to the next one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Method;
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::result::{RouteMatch, RoutingResult};
use crate::config::{RouterConfig, TrailingSlash};
use crate::error::RouterError;
use crate::route::{PatternToken, Route, RouteCollection, SUPPORTED_METHODS};

/// A route reference inside the compiled dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSlot {
    /// Registration index in the route collection
    pub index: usize,
    pub name: String,
}

/// Ordered alternatives sharing one static prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchGroup {
    pub prefix: String,
    /// Anchored regex per alternative, in registration order
    pub regexes: Vec<String>,
    /// Route per alternative, parallel to `regexes`
    pub routes: Vec<RouteSlot>,
}

/// Static and dynamic routes of one HTTP method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodTable {
    /// Exact path to the earliest route registered for it
    pub statics: BTreeMap<String, RouteSlot>,
    pub groups: Vec<DispatchGroup>,
}

/// Pre-built dispatch data for a whole route collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledDispatch {
    pub trailing_slash: TrailingSlash,
    pub chunk_size: usize,
    pub route_count: usize,
    pub methods: BTreeMap<String, MethodTable>,
}

/// Anchored regex for a route under the given trailing slash policy
#[must_use]
pub fn anchored_regex(route: &Route, policy: TrailingSlash) -> String {
    let compiled = route.compiled();
    let mut regex = String::with_capacity(compiled.match_regex.len() + 8);
    regex.push('^');
    // `/{slug?}` without its segment is the root path, which the optional
    // group alone cannot match.
    let bare_root = policy == TrailingSlash::Strict
        && matches!(compiled.tokens.first(), Some(PatternToken::Optional(_)));
    if bare_root {
        regex.push_str("(?:");
        regex.push_str(&compiled.match_regex);
        regex.push_str("|/)");
    } else {
        regex.push_str(&compiled.match_regex);
    }
    if policy == TrailingSlash::Normalize && compiled.pattern != "/" && !compiled.has_trailing_slash()
    {
        regex.push_str("/?");
    }
    regex.push('$');
    regex
}

/// Collects routes and builds a [`CompiledDispatch`]
#[derive(Debug)]
pub struct DispatchCompiler {
    trailing_slash: TrailingSlash,
    chunk_size: usize,
    routes: Vec<Arc<Route>>,
}

impl DispatchCompiler {
    #[must_use]
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            trailing_slash: config.trailing_slash,
            chunk_size: config.chunk_size.max(1),
            routes: Vec::new(),
        }
    }

    /// Queue a route; its registration index is the number of routes added
    /// before it.
    pub fn add(&mut self, route: Arc<Route>) {
        self.routes.push(route);
    }

    /// Compile every route of `collection` in registration order
    #[must_use]
    pub fn compile(collection: &RouteCollection, config: &RouterConfig) -> CompiledDispatch {
        let mut compiler = Self::new(config);
        for route in collection.iter() {
            compiler.add(Arc::clone(route));
        }
        compiler.build()
    }

    #[must_use]
    pub fn build(&self) -> CompiledDispatch {
        let started = Instant::now();
        // Per method: statics plus dynamic entries bucketed by prefix in
        // first-seen order.
        let mut statics: BTreeMap<String, BTreeMap<String, RouteSlot>> = BTreeMap::new();
        let mut buckets: BTreeMap<String, Vec<(String, Vec<(String, RouteSlot)>)>> =
            BTreeMap::new();

        for (index, route) in self.routes.iter().enumerate() {
            let slot = RouteSlot {
                index,
                name: route.name().to_string(),
            };
            for method in route.methods().iter() {
                let method = method.as_str().to_string();
                if route.compiled().is_static() {
                    let table = statics.entry(method).or_default();
                    if let Some(existing) = table.get(route.pattern()) {
                        warn!(
                            route_name = %route.name(),
                            shadowed_by = %existing.name,
                            pattern = %route.pattern(),
                            "Static route is shadowed by an earlier route"
                        );
                        continue;
                    }
                    table.insert(route.pattern().to_string(), slot.clone());
                } else {
                    let prefix = &route.compiled().static_prefix;
                    let method_buckets = buckets.entry(method).or_default();
                    let regex = anchored_regex(route, self.trailing_slash);
                    match method_buckets.iter_mut().find(|(p, _)| p == prefix) {
                        Some((_, entries)) => entries.push((regex, slot.clone())),
                        None => method_buckets.push((prefix.clone(), vec![(regex, slot.clone())])),
                    }
                }
            }
        }

        let mut methods: BTreeMap<String, MethodTable> = BTreeMap::new();
        for (method, table) in statics {
            methods.entry(method).or_default().statics = table;
        }
        let mut group_count = 0usize;
        for (method, method_buckets) in buckets {
            let table = methods.entry(method).or_default();
            for (prefix, entries) in method_buckets {
                for chunk in entries.chunks(self.chunk_size) {
                    let (regexes, routes) = chunk.iter().cloned().unzip();
                    table.groups.push(DispatchGroup {
                        prefix: prefix.clone(),
                        regexes,
                        routes,
                    });
                    group_count += 1;
                }
            }
        }

        info!(
            routes_count = self.routes.len(),
            methods_count = methods.len(),
            group_count = group_count,
            chunk_size = self.chunk_size,
            trailing_slash = %self.trailing_slash,
            duration_us = started.elapsed().as_micros() as u64,
            "Route dispatch compiled"
        );

        CompiledDispatch {
            trailing_slash: self.trailing_slash,
            chunk_size: self.chunk_size,
            route_count: self.routes.len(),
            methods,
        }
    }
}

struct CompiledGroup {
    prefix: String,
    set: RegexSet,
    regexes: Vec<Regex>,
    routes: Vec<(usize, Arc<Route>)>,
}

impl CompiledGroup {
    #[inline]
    fn applies_to(&self, path: &str) -> bool {
        self.prefix.is_empty()
            || (path.starts_with(self.prefix.as_str())
                && matches!(path.as_bytes().get(self.prefix.len()), None | Some(b'/')))
    }

    #[inline]
    fn first_index(&self) -> usize {
        self.routes.first().map_or(usize::MAX, |(i, _)| *i)
    }
}

#[derive(Default)]
struct MethodMatcher {
    statics: HashMap<String, (usize, Arc<Route>)>,
    groups: Vec<CompiledGroup>,
}

struct Candidate<'a> {
    index: usize,
    route: &'a Arc<Route>,
    /// Decoded segment values captured from the path
    params: BTreeMap<String, String>,
}

/// Matches requests against a [`CompiledDispatch`].
///
/// Read-only after construction; share it behind `Arc` between workers.
pub struct UrlMatcher {
    dispatch: CompiledDispatch,
    tables: HashMap<Method, MethodMatcher>,
}

impl std::fmt::Debug for UrlMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlMatcher")
            .field("trailing_slash", &self.dispatch.trailing_slash)
            .field("route_count", &self.dispatch.route_count)
            .field("methods", &self.dispatch.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn resolve_slot(slot: &RouteSlot, routes: &RouteCollection) -> Result<Arc<Route>, RouterError> {
    match (routes.index_of(&slot.name), routes.get(&slot.name)) {
        (Some(index), Some(route)) if index == slot.index => Ok(Arc::clone(route)),
        (Some(index), Some(_)) => Err(RouterError::CacheCorrupt(format!(
            "route '{}' is registered at index {} but the dispatch expects {}",
            slot.name, index, slot.index
        ))),
        _ => Err(RouterError::CacheCorrupt(format!(
            "dispatch references unknown route '{}'",
            slot.name
        ))),
    }
}

impl UrlMatcher {
    /// Bind a compiled dispatch to the routes it was compiled from.
    ///
    /// Fails with `CacheCorrupt` when the dispatch references routes that do
    /// not exist in `routes` (or sit at another index), and with
    /// `InvalidPattern` when a stored regex does not compile.
    pub fn new(dispatch: CompiledDispatch, routes: &RouteCollection) -> Result<Self, RouterError> {
        if dispatch.route_count != routes.len() {
            return Err(RouterError::CacheCorrupt(format!(
                "dispatch was compiled for {} routes, collection has {}",
                dispatch.route_count,
                routes.len()
            )));
        }
        let mut tables = HashMap::with_capacity(dispatch.methods.len());
        for (method_name, table) in &dispatch.methods {
            let method = Method::from_bytes(method_name.as_bytes())
                .ok()
                .filter(|m| SUPPORTED_METHODS.contains(m))
                .ok_or_else(|| {
                    RouterError::CacheCorrupt(format!("unknown method '{}'", method_name))
                })?;
            let mut matcher = MethodMatcher::default();
            for (path, slot) in &table.statics {
                matcher
                    .statics
                    .insert(path.clone(), (slot.index, resolve_slot(slot, routes)?));
            }
            for group in &table.groups {
                if group.regexes.len() != group.routes.len() || group.regexes.is_empty() {
                    return Err(RouterError::CacheCorrupt(format!(
                        "dispatch group '{}' has {} regexes for {} routes",
                        group.prefix,
                        group.regexes.len(),
                        group.routes.len()
                    )));
                }
                let set = RegexSet::new(&group.regexes).map_err(|e| {
                    RouterError::invalid_pattern(&group.prefix, e.to_string())
                })?;
                let regexes = group
                    .regexes
                    .iter()
                    .map(|src| Regex::new(src).map_err(|e| RouterError::invalid_pattern(src, e.to_string())))
                    .collect::<Result<Vec<_>, _>>()?;
                let routes = group
                    .routes
                    .iter()
                    .map(|slot| resolve_slot(slot, routes).map(|r| (slot.index, r)))
                    .collect::<Result<Vec<_>, _>>()?;
                matcher.groups.push(CompiledGroup {
                    prefix: group.prefix.clone(),
                    set,
                    regexes,
                    routes,
                });
            }
            tables.insert(method, matcher);
        }
        Ok(Self { dispatch, tables })
    }

    /// The dispatch data this matcher runs on
    #[must_use]
    pub fn dispatch(&self) -> &CompiledDispatch {
        &self.dispatch
    }

    #[must_use]
    pub fn trailing_slash(&self) -> TrailingSlash {
        self.dispatch.trailing_slash
    }

    fn lookup<'a>(&'a self, method: &Method, path: &str) -> Option<Candidate<'a>> {
        let table = self.tables.get(method)?;
        let mut best: Option<Candidate<'a>> = None;

        let static_hit = table.statics.get(path).or_else(|| {
            if self.dispatch.trailing_slash != TrailingSlash::Normalize {
                return None;
            }
            // Only one slash is dropped, and never down to the root: `//`
            // does not match `/`.
            path.strip_suffix('/')
                .filter(|trimmed| !trimmed.is_empty() && !trimmed.ends_with('/'))
                .and_then(|trimmed| table.statics.get(trimmed))
        });
        if let Some((index, route)) = static_hit {
            best = Some(Candidate {
                index: *index,
                route,
                params: BTreeMap::new(),
            });
        }

        for group in &table.groups {
            if best.as_ref().is_some_and(|b| group.first_index() > b.index) {
                continue;
            }
            if !group.applies_to(path) {
                continue;
            }
            for alt in group.set.matches(path).iter() {
                let (index, route) = &group.routes[alt];
                if best.as_ref().is_some_and(|b| *index > b.index) {
                    break;
                }
                if let Some(params) = capture(route, &group.regexes[alt], path) {
                    best = Some(Candidate {
                        index: *index,
                        route,
                        params,
                    });
                    break;
                }
            }
        }
        best
    }

    fn matched(candidate: Candidate<'_>) -> RoutingResult {
        let Candidate { route, mut params, .. } = candidate;
        for (key, value) in route.defaults() {
            params
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        RoutingResult::Matched(RouteMatch {
            route: Arc::clone(route),
            params,
        })
    }

    /// Match a request.
    ///
    /// `path` may carry a query string or fragment; both are ignored. An
    /// empty path is treated as `/`. HEAD requests fall back to GET routes
    /// when no HEAD route matches.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> RoutingResult {
        let started = Instant::now();
        let path = request_path(path);

        debug!(method = %method, path = %path, "Route match attempt");

        let mut candidate = self.lookup(method, path);
        if candidate.is_none() && *method == Method::HEAD {
            candidate = self.lookup(&Method::GET, path);
        }

        if let Some(candidate) = candidate {
            let result = Self::matched(candidate);
            let elapsed = started.elapsed();
            if let RoutingResult::Matched(m) = &result {
                if elapsed > Duration::from_millis(1) {
                    warn!(
                        method = %method,
                        path = %path,
                        route_name = %m.route.name(),
                        route_pattern = %m.route.pattern(),
                        duration_us = elapsed.as_micros() as u64,
                        "Slow route matching detected"
                    );
                } else {
                    debug!(
                        method = %method,
                        path = %path,
                        route_name = %m.route.name(),
                        route_pattern = %m.route.pattern(),
                        path_params = ?m.params,
                        duration_us = elapsed.as_micros() as u64,
                        "Route matched"
                    );
                }
            }
            return result;
        }

        let allowed: Vec<Method> = SUPPORTED_METHODS
            .iter()
            .filter(|m| *m != method && self.lookup(m, path).is_some())
            .cloned()
            .collect();

        if allowed.is_empty() {
            debug!(
                method = %method,
                path = %path,
                duration_us = started.elapsed().as_micros() as u64,
                "No route matched"
            );
            RoutingResult::NoMatch
        } else {
            debug!(
                method = %method,
                path = %path,
                allowed = ?allowed,
                "Path matched for other methods"
            );
            RoutingResult::MethodNotAllowed(allowed)
        }
    }
}

/// Decoded segment values of `path`, or `None` when a decoded value breaks
/// its requirement.
fn capture(route: &Route, regex: &Regex, path: &str) -> Option<BTreeMap<String, String>> {
    let caps = regex.captures(path)?;
    let mut params = BTreeMap::new();
    for name in route.segment_names() {
        let Some(m) = caps.name(name) else {
            continue;
        };
        let raw = m.as_str().trim_end_matches('/');
        if raw.is_empty() {
            continue;
        }
        let value = urlencoding::decode(raw)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        if !route.satisfies_requirement(name, &value) {
            return None;
        }
        params.insert(name.clone(), value);
    }
    Some(params)
}

/// Strip query string and fragment; an empty path becomes `/`.
fn request_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteRegistrar;

    fn matcher(define: impl FnOnce(&mut RouteRegistrar), config: &RouterConfig) -> UrlMatcher {
        let mut r = RouteRegistrar::new();
        define(&mut r);
        let routes = r.into_collection().unwrap();
        let dispatch = DispatchCompiler::compile(&routes, config);
        UrlMatcher::new(dispatch, &routes).unwrap()
    }

    #[test]
    fn test_request_path() {
        assert_eq!(request_path(""), "/");
        assert_eq!(request_path("/a?b=c"), "/a");
        assert_eq!(request_path("/a#top"), "/a");
    }

    #[test]
    fn test_groups_are_chunked_by_prefix() {
        let config = RouterConfig::default().with_chunk_size(2);
        let mut r = RouteRegistrar::new();
        for i in 0..5 {
            r.get(&format!("u{}", i), &format!("/users/{{id}}/t{}", i), "h")
                .unwrap();
        }
        r.get("page", "/{slug}", "h").unwrap();
        let routes = r.into_collection().unwrap();
        let dispatch = DispatchCompiler::compile(&routes, &config);
        let groups = &dispatch.methods["GET"].groups;
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[0].prefix, "/users");
        assert_eq!(groups[0].routes.len(), 2);
        assert_eq!(groups[2].routes.len(), 1);
        assert_eq!(groups[3].prefix, "");
    }

    #[test]
    fn test_earlier_registration_wins_across_groups() {
        let m = matcher(
            |r| {
                r.get("catch", "/{slug}", "h").unwrap();
                r.get("about", "/about", "h").unwrap();
            },
            &RouterConfig::default(),
        );
        let result = m.match_route(&Method::GET, "/about");
        assert_eq!(result.route().unwrap().name(), "catch");
    }

    #[test]
    fn test_static_wins_when_registered_first() {
        let m = matcher(
            |r| {
                r.get("about", "/about", "h").unwrap();
                r.get("catch", "/{slug}", "h").unwrap();
            },
            &RouterConfig::default(),
        );
        assert_eq!(
            m.match_route(&Method::GET, "/about").route().unwrap().name(),
            "about"
        );
        assert_eq!(
            m.match_route(&Method::GET, "/contact").params()["slug"],
            "contact"
        );
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let m = matcher(
            |r| {
                r.get("a", "/a", "h").unwrap();
            },
            &RouterConfig::default(),
        );
        assert!(m.match_route(&Method::HEAD, "/a").is_match());
    }

    #[test]
    fn test_stale_dispatch_rejected() {
        let mut r = RouteRegistrar::new();
        r.get("a", "/a/{id}", "h").unwrap();
        let routes = r.into_collection().unwrap();
        let dispatch = DispatchCompiler::compile(&routes, &RouterConfig::default());

        let mut other = RouteRegistrar::new();
        other.get("b", "/b/{id}", "h").unwrap();
        let other = other.into_collection().unwrap();
        assert!(matches!(
            UrlMatcher::new(dispatch, &other),
            Err(RouterError::CacheCorrupt(_))
        ));
    }
}
