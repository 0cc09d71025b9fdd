//! Middleware resolution.
//!
//! A route's middleware entries are strings: `name` or `name:arg1,arg2`.
//! [`MiddlewareStack::resolve_for_route`] turns the global entries followed
//! by the route's own into an ordered list of [`MiddlewareRef`]:
//!
//! 1. group names expand recursively into their members
//! 2. aliases are replaced by the concrete identifier they point to
//! 3. exact duplicates (same identifier and arguments) are dropped, first
//!    occurrence wins
//! 4. the list is stable-sorted by position in the priority table;
//!    identifiers not in the table go last in their original order
//!
//! Every name must resolve to a concrete identifier the stack knows about,
//! otherwise resolution fails with a `Configuration` error.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MiddlewareConfig;
use crate::error::RouterError;
use crate::route::{Route, RouteCollection};

/// A concrete middleware identifier with its arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MiddlewareRef {
    pub id: String,
    pub args: Vec<String>,
}

impl MiddlewareRef {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(id: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}:{}", self.id, self.args.join(","))
        }
    }
}

/// Split `name:arg1,arg2` into its name and arguments
#[must_use]
pub fn parse_entry(entry: &str) -> (&str, Vec<String>) {
    match entry.trim().split_once(':') {
        Some((name, args)) => (
            name.trim(),
            args.split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
        ),
        None => (entry.trim(), Vec::new()),
    }
}

/// Source of concrete middleware identifiers that can be instantiated
pub trait MiddlewareResolvable {
    fn is_resolvable(&self, id: &str) -> bool;

    /// Every identifier this source can instantiate
    fn known_ids(&self) -> Vec<String>;
}

impl MiddlewareResolvable for BTreeSet<String> {
    fn is_resolvable(&self, id: &str) -> bool {
        self.contains(id)
    }

    fn known_ids(&self) -> Vec<String> {
        self.iter().cloned().collect()
    }
}

/// Alias, group and priority tables, validated up front
#[derive(Debug, Clone)]
pub struct MiddlewareStack {
    config: MiddlewareConfig,
    known: BTreeSet<String>,
    priority: HashMap<String, usize>,
}

impl MiddlewareStack {
    /// Build a stack. `known` lists the concrete identifiers that can be
    /// instantiated; alias targets count as known as well.
    ///
    /// Fails when a name is both an alias and a group, when a group refers
    /// to itself (directly or through other groups), or when a group member
    /// or global entry cannot be resolved.
    pub fn new<I, S>(config: MiddlewareConfig, known: I) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known: BTreeSet<String> = known.into_iter().map(Into::into).collect();
        known.extend(config.aliases.values().cloned());

        if let Some(name) = config.aliases.keys().find(|k| config.groups.contains_key(*k)) {
            return Err(RouterError::configuration(format!(
                "Middleware name '{}' is defined both as an alias and as a group",
                name
            )));
        }

        let mut priority = HashMap::with_capacity(config.priority.len());
        for entry in &config.priority {
            let (name, _) = parse_entry(entry);
            let id = config
                .aliases
                .get(name)
                .cloned()
                .unwrap_or_else(|| name.to_string());
            let next = priority.len();
            priority.entry(id).or_insert(next);
        }

        let stack = Self {
            config,
            known,
            priority,
        };

        // Expand every group and the global list once so mistakes surface
        // before any route is resolved.
        for group in stack.config.groups.keys() {
            stack.expand_all([group.as_str()], &format!("group '{}'", group))?;
        }
        stack.expand_all(stack.config.global.iter().map(String::as_str), "global middleware")?;

        Ok(stack)
    }

    /// Build a stack whose known identifiers come from `registry`
    pub fn with_registry<R>(config: MiddlewareConfig, registry: &R) -> Result<Self, RouterError>
    where
        R: MiddlewareResolvable + ?Sized,
    {
        Self::new(config, registry.known_ids())
    }

    #[must_use]
    pub fn config(&self) -> &MiddlewareConfig {
        &self.config
    }

    fn is_known(&self, id: &str) -> bool {
        self.known.is_resolvable(id)
    }

    fn expand(
        &self,
        entry: &str,
        context: &str,
        path: &mut Vec<String>,
        out: &mut Vec<MiddlewareRef>,
    ) -> Result<(), RouterError> {
        let (name, args) = parse_entry(entry);
        if name.is_empty() {
            return Err(RouterError::configuration(format!(
                "Empty middleware entry in {}",
                context
            )));
        }

        if let Some(members) = self.config.groups.get(name) {
            if !args.is_empty() {
                return Err(RouterError::configuration(format!(
                    "Middleware group '{}' in {} does not take arguments",
                    name, context
                )));
            }
            if path.iter().any(|p| p == name) {
                return Err(RouterError::configuration(format!(
                    "Cyclic middleware group reference in {}: {} -> {}",
                    context,
                    path.join(" -> "),
                    name
                )));
            }
            path.push(name.to_string());
            for member in members {
                self.expand(member, context, path, out)?;
            }
            path.pop();
            return Ok(());
        }

        if let Some(concrete) = self.config.aliases.get(name) {
            out.push(MiddlewareRef {
                id: concrete.clone(),
                args,
            });
            return Ok(());
        }

        if self.is_known(name) {
            out.push(MiddlewareRef {
                id: name.to_string(),
                args,
            });
            return Ok(());
        }

        Err(RouterError::configuration(format!(
            "Middleware '{}' in {} is not an alias, a group or a known middleware",
            name, context
        )))
    }

    fn expand_all<'e, I>(&self, entries: I, context: &str) -> Result<Vec<MiddlewareRef>, RouterError>
    where
        I: IntoIterator<Item = &'e str>,
    {
        let mut out = Vec::new();
        let mut path = Vec::new();
        for entry in entries {
            self.expand(entry, context, &mut path, &mut out)?;
        }
        Ok(out)
    }

    /// Expand, deduplicate and priority-sort arbitrary entries
    pub fn resolve_entries<'e, I>(&self, entries: I, context: &str) -> Result<Vec<MiddlewareRef>, RouterError>
    where
        I: IntoIterator<Item = &'e str>,
    {
        let expanded = self.expand_all(entries, context)?;

        let mut seen = HashSet::with_capacity(expanded.len());
        let mut resolved: Vec<MiddlewareRef> = expanded
            .into_iter()
            .filter(|r| seen.insert(r.clone()))
            .collect();

        resolved.sort_by_key(|r| self.priority.get(&r.id).copied().unwrap_or(usize::MAX));
        Ok(resolved)
    }

    /// Ordered middleware for `route`: global entries, then the route's own
    pub fn resolve_for_route(&self, route: &Route) -> Result<Vec<MiddlewareRef>, RouterError> {
        let context = format!("route '{}'", route.name());
        let entries = self
            .config
            .global
            .iter()
            .chain(route.middleware().iter())
            .map(String::as_str);
        let resolved = self.resolve_entries(entries, &context)?;
        debug!(
            route_name = %route.name(),
            middleware = ?resolved.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Middleware resolved"
        );
        Ok(resolved)
    }

    /// Resolve every route once; fails on the first misconfigured route
    pub fn validate_routes(&self, routes: &RouteCollection) -> Result<(), RouterError> {
        for route in routes.iter() {
            self.resolve_for_route(route)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(config: MiddlewareConfig) -> Result<MiddlewareStack, RouterError> {
        MiddlewareStack::new(config, ["SessionMw", "ThrottleMw", "LogMw"])
    }

    fn ids(refs: &[MiddlewareRef]) -> Vec<String> {
        refs.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_entry() {
        assert_eq!(parse_entry("auth"), ("auth", vec![]));
        assert_eq!(
            parse_entry("throttle:60, 1"),
            ("throttle", vec!["60".to_string(), "1".to_string()])
        );
    }

    #[test]
    fn test_priority_overrides_declaration_order() {
        let config = MiddlewareConfig::new()
            .alias("auth", "AuthMw")
            .alias("csrf", "CsrfMw")
            .priority(["AuthMw", "CsrfMw"]);
        let s = stack(config).unwrap();
        let resolved = s.resolve_entries(["csrf", "auth"], "test").unwrap();
        assert_eq!(ids(&resolved), vec!["AuthMw", "CsrfMw"]);
    }

    #[test]
    fn test_unlisted_keep_relative_order_after_listed() {
        let config = MiddlewareConfig::new()
            .alias("auth", "AuthMw")
            .priority(["auth"]);
        let s = stack(config).unwrap();
        let resolved = s
            .resolve_entries(["LogMw", "SessionMw", "auth"], "test")
            .unwrap();
        assert_eq!(ids(&resolved), vec!["AuthMw", "LogMw", "SessionMw"]);
    }

    #[test]
    fn test_groups_expand_recursively_and_dedupe() {
        let config = MiddlewareConfig::new()
            .alias("auth", "AuthMw")
            .group("web", ["SessionMw", "LogMw"])
            .group("admin", ["web", "auth"]);
        let s = stack(config).unwrap();
        let resolved = s.resolve_entries(["admin", "LogMw"], "test").unwrap();
        assert_eq!(ids(&resolved), vec!["SessionMw", "LogMw", "AuthMw"]);
    }

    #[test]
    fn test_args_distinguish_duplicates() {
        let s = stack(MiddlewareConfig::new().alias("throttle", "ThrottleMw")).unwrap();
        let resolved = s
            .resolve_entries(["throttle:10", "ThrottleMw:10", "throttle:20"], "test")
            .unwrap();
        assert_eq!(ids(&resolved), vec!["ThrottleMw:10", "ThrottleMw:20"]);
    }

    #[test]
    fn test_cycle_detected_at_construction() {
        let config = MiddlewareConfig::new()
            .group("a", ["b"])
            .group("b", ["LogMw", "a"]);
        let err = stack(config).unwrap_err();
        assert!(err.to_string().contains("Cyclic"));
    }

    #[test]
    fn test_unknown_middleware_rejected() {
        let s = stack(MiddlewareConfig::new()).unwrap();
        let err = s.resolve_entries(["nope"], "route 'home'").unwrap_err();
        assert_eq!(
            err,
            RouterError::Configuration(
                "Middleware 'nope' in route 'home' is not an alias, a group or a known middleware"
                    .into()
            )
        );
    }

    #[test]
    fn test_group_with_args_rejected() {
        let s = stack(MiddlewareConfig::new().group("web", ["LogMw"])).unwrap();
        assert!(s.resolve_entries(["web:1"], "test").is_err());
    }

    #[test]
    fn test_alias_group_clash_rejected() {
        let config = MiddlewareConfig::new()
            .alias("web", "LogMw")
            .group("web", ["LogMw"]);
        assert!(stack(config).is_err());
    }

    #[test]
    fn test_global_entries_come_first() {
        let config = MiddlewareConfig::new().global(["LogMw"]);
        let s = stack(config).unwrap();
        let mut r = crate::route::RouteRegistrar::new();
        r.get("home", "/", "h")
            .unwrap()
            .middleware(["SessionMw"])
            .unwrap();
        let routes = r.into_collection().unwrap();
        let resolved = s.resolve_for_route(routes.get("home").unwrap()).unwrap();
        assert_eq!(ids(&resolved), vec!["LogMw", "SessionMw"]);
    }
}
