//! Route definition surface.
//!
//! ```rust
//! use routeline::route::{GroupAttributes, RouteRegistrar};
//!
//! # fn main() -> Result<(), routeline::RouterError> {
//! let mut r = RouteRegistrar::new();
//! r.get("home", "/", "HomeController@index")?;
//! r.get("users.show", "/users/{id}", "UserController@show")?
//!     .requirement("id", "[0-9]+")?
//!     .middleware(["auth"])?;
//! r.group(GroupAttributes::new().prefix("/admin").name_prefix("admin."), |r| {
//!     r.get("dashboard", "/", "DashboardController@index")?;
//!     Ok(())
//! })?;
//! let routes = r.into_collection()?;
//! assert_eq!(routes.get("admin.dashboard").unwrap().pattern(), "/admin");
//! # Ok(())
//! # }
//! ```

use super::collection::RouteCollection;
use super::route::{HandlerRef, MethodSet, Route};
use crate::error::RouterError;
use http::Method;

/// Anything that can name a route handler
pub trait IntoHandlerRef {
    fn into_handler_ref(self) -> Result<HandlerRef, RouterError>;
}

impl IntoHandlerRef for HandlerRef {
    fn into_handler_ref(self) -> Result<HandlerRef, RouterError> {
        Ok(self)
    }
}

impl IntoHandlerRef for &str {
    fn into_handler_ref(self) -> Result<HandlerRef, RouterError> {
        self.parse()
    }
}

impl IntoHandlerRef for String {
    fn into_handler_ref(self) -> Result<HandlerRef, RouterError> {
        self.parse()
    }
}

/// Attributes shared by every route registered inside a group
#[derive(Debug, Clone, Default)]
pub struct GroupAttributes {
    pub prefix: String,
    pub namespace: Option<String>,
    pub name_prefix: String,
    pub middleware: Vec<String>,
}

impl GroupAttributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn middleware<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middleware.extend(entries.into_iter().map(Into::into));
        self
    }
}

/// Join a group prefix and a route pattern.
fn join_prefix(prefix: &str, pattern: &str) -> String {
    let prefix = prefix.trim().trim_end_matches('/');
    if prefix.is_empty() {
        return pattern.to_string();
    }
    let pattern = pattern.trim();
    let prefix = if prefix.starts_with('/') {
        prefix.to_string()
    } else {
        format!("/{}", prefix)
    };
    match pattern {
        "" | "/" => prefix,
        p if p.starts_with('/') => format!("{}{}", prefix, p),
        p => format!("{}/{}", prefix, p),
    }
}

/// Chainable modifiers for the route just registered
pub struct PendingRoute<'a> {
    route: &'a mut Route,
    name_prefix: String,
}

impl<'a> PendingRoute<'a> {
    /// Attach middleware entries (`name` or `name:arg1,arg2`)
    pub fn middleware<I, S>(self, entries: I) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for entry in entries {
            self.route.add_middleware(entry.as_ref())?;
        }
        Ok(self)
    }

    /// Constrain one segment with a regex fragment
    pub fn requirement(self, segment: &str, fragment: &str) -> Result<Self, RouterError> {
        self.route.add_requirement(segment, fragment)?;
        Ok(self)
    }

    pub fn requirements<I, K, V>(self, pairs: I) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (segment, fragment) in pairs {
            self.route
                .add_requirement(segment.as_ref(), fragment.as_ref())?;
        }
        Ok(self)
    }

    pub fn default_value(self, key: &str, value: impl ToString) -> Self {
        self.route.add_default(key, value.to_string());
        self
    }

    pub fn defaults<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        for (key, value) in pairs {
            self.route.add_default(key.as_ref(), value.to_string());
        }
        self
    }

    /// Rename the route; the enclosing groups' name prefixes still apply
    pub fn name(self, name: &str) -> Self {
        self.route
            .set_name(&format!("{}{}", self.name_prefix, name));
        self
    }

    /// The route as currently defined
    #[must_use]
    pub fn route(&self) -> &Route {
        self.route
    }
}

/// Collects route definitions, applying group scopes.
#[derive(Debug, Default)]
pub struct RouteRegistrar {
    routes: Vec<Route>,
    scopes: Vec<GroupAttributes>,
    namespace: Option<String>,
}

impl RouteRegistrar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace applied to unqualified controller classes outside of any
    /// group that sets its own
    #[must_use]
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    pub fn get<H: IntoHandlerRef>(
        &mut self,
        name: &str,
        pattern: &str,
        handler: H,
    ) -> Result<PendingRoute<'_>, RouterError> {
        self.add(MethodSet::from_methods(vec![Method::GET]), name, pattern, handler)
    }

    pub fn post<H: IntoHandlerRef>(
        &mut self,
        name: &str,
        pattern: &str,
        handler: H,
    ) -> Result<PendingRoute<'_>, RouterError> {
        self.add(MethodSet::from_methods(vec![Method::POST]), name, pattern, handler)
    }

    pub fn put<H: IntoHandlerRef>(
        &mut self,
        name: &str,
        pattern: &str,
        handler: H,
    ) -> Result<PendingRoute<'_>, RouterError> {
        self.add(MethodSet::from_methods(vec![Method::PUT]), name, pattern, handler)
    }

    pub fn patch<H: IntoHandlerRef>(
        &mut self,
        name: &str,
        pattern: &str,
        handler: H,
    ) -> Result<PendingRoute<'_>, RouterError> {
        self.add(MethodSet::from_methods(vec![Method::PATCH]), name, pattern, handler)
    }

    pub fn delete<H: IntoHandlerRef>(
        &mut self,
        name: &str,
        pattern: &str,
        handler: H,
    ) -> Result<PendingRoute<'_>, RouterError> {
        self.add(MethodSet::from_methods(vec![Method::DELETE]), name, pattern, handler)
    }

    pub fn options<H: IntoHandlerRef>(
        &mut self,
        name: &str,
        pattern: &str,
        handler: H,
    ) -> Result<PendingRoute<'_>, RouterError> {
        self.add(MethodSet::from_methods(vec![Method::OPTIONS]), name, pattern, handler)
    }

    /// Register for every supported method
    pub fn any<H: IntoHandlerRef>(
        &mut self,
        name: &str,
        pattern: &str,
        handler: H,
    ) -> Result<PendingRoute<'_>, RouterError> {
        self.add(MethodSet::any(), name, pattern, handler)
    }

    /// Register for an explicit list of methods
    pub fn match_methods<M, H>(
        &mut self,
        methods: M,
        name: &str,
        pattern: &str,
        handler: H,
    ) -> Result<PendingRoute<'_>, RouterError>
    where
        M: IntoIterator,
        M::Item: AsRef<str>,
        H: IntoHandlerRef,
    {
        let methods = MethodSet::parse(methods)?;
        self.add(methods, name, pattern, handler)
    }

    /// Register a route with the current group scope applied
    pub fn add<H: IntoHandlerRef>(
        &mut self,
        methods: MethodSet,
        name: &str,
        pattern: &str,
        handler: H,
    ) -> Result<PendingRoute<'_>, RouterError> {
        let handler = handler.into_handler_ref()?;
        let full_pattern = self
            .scopes
            .iter()
            .rev()
            .fold(pattern.to_string(), |acc, scope| join_prefix(&scope.prefix, &acc));
        let name_prefix: String = self
            .scopes
            .iter()
            .map(|s| s.name_prefix.as_str())
            .collect();
        let namespace = self
            .scopes
            .iter()
            .rev()
            .find_map(|s| s.namespace.clone())
            .or_else(|| self.namespace.clone());

        let mut route = Route::new(methods, name, &full_pattern, handler, namespace.as_deref())?;
        if !name.trim().is_empty() && !name_prefix.is_empty() {
            route.prefix_name(&name_prefix);
        }
        for scope in &self.scopes {
            for entry in &scope.middleware {
                route.add_middleware(entry)?;
            }
        }

        self.routes.push(route);
        let route = self
            .routes
            .last_mut()
            .ok_or_else(|| RouterError::configuration("route registration failed"))?;
        Ok(PendingRoute { route, name_prefix })
    }

    /// Register routes inside a scope that applies `attributes` to each.
    /// Groups nest: prefixes and name prefixes concatenate, middleware
    /// accumulates outermost first, the innermost namespace wins.
    pub fn group<F>(&mut self, attributes: GroupAttributes, define: F) -> Result<(), RouterError>
    where
        F: FnOnce(&mut Self) -> Result<(), RouterError>,
    {
        self.scopes.push(attributes);
        let result = define(self);
        self.scopes.pop();
        result
    }

    /// Number of routes defined so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Freeze the definitions. Fails on the first duplicate route name.
    pub fn into_collection(self) -> Result<RouteCollection, RouterError> {
        let mut collection = RouteCollection::new();
        for route in self.routes {
            collection.add(route)?;
        }
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_prefix() {
        assert_eq!(join_prefix("", "/a"), "/a");
        assert_eq!(join_prefix("/admin", "/"), "/admin");
        assert_eq!(join_prefix("/admin/", "/users"), "/admin/users");
        assert_eq!(join_prefix("admin", "users"), "/admin/users");
    }

    #[test]
    fn test_nested_groups() {
        let mut r = RouteRegistrar::with_namespace("app");
        r.group(
            GroupAttributes::new()
                .prefix("/admin")
                .name_prefix("admin.")
                .middleware(["auth"]),
            |r| {
                r.group(
                    GroupAttributes::new()
                        .prefix("/users")
                        .name_prefix("users.")
                        .namespace("app::admin")
                        .middleware(["can:manage-users"]),
                    |r| {
                        r.get("show", "/{id}", "UserController@show")?
                            .middleware(["throttle:60"])?;
                        Ok(())
                    },
                )
            },
        )
        .unwrap();
        let routes = r.into_collection().unwrap();
        let route = routes.get("admin.users.show").unwrap();
        assert_eq!(route.pattern(), "/admin/users/{id}");
        assert_eq!(
            route.middleware(),
            &["auth".to_string(), "can:manage-users".into(), "throttle:60".into()]
        );
        assert_eq!(route.handler().to_string(), "app::admin::UserController@show");
    }

    #[test]
    fn test_default_namespace() {
        let mut r = RouteRegistrar::with_namespace("app::http");
        r.get("home", "/", "HomeController@index").unwrap();
        let routes = r.into_collection().unwrap();
        assert_eq!(
            routes.get("home").unwrap().handler(),
            &HandlerRef::controller("app::http::HomeController", "index")
        );
    }

    #[test]
    fn test_rename_keeps_group_prefix() {
        let mut r = RouteRegistrar::new();
        r.group(GroupAttributes::new().name_prefix("api."), |r| {
            r.get("tmp", "/ping", "ping")?.name("ping");
            Ok(())
        })
        .unwrap();
        let routes = r.into_collection().unwrap();
        assert!(routes.get("api.ping").is_some());
    }

    #[test]
    fn test_group_middleware_collides_with_route_middleware() {
        let mut r = RouteRegistrar::new();
        let err = r
            .group(GroupAttributes::new().middleware(["auth"]), |r| {
                r.get("a", "/a", "a")?.middleware(["auth:admin"])?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, RouterError::DuplicateMiddleware { .. }));
    }

    #[test]
    fn test_duplicate_names_fail_at_build() {
        let mut r = RouteRegistrar::new();
        r.get("home", "/", "a").unwrap();
        r.post("home", "/home", "b").unwrap();
        assert_eq!(
            r.into_collection().unwrap_err(),
            RouterError::DuplicateRouteName("home".into())
        );
    }

    #[test]
    fn test_match_methods() {
        let mut r = RouteRegistrar::new();
        r.match_methods(["GET", "POST"], "form", "/form", "FormController@handle")
            .unwrap();
        assert!(r.match_methods(["BREW"], "tea", "/tea", "pot").is_err());
        let routes = r.into_collection().unwrap();
        assert_eq!(routes.get("form").unwrap().methods().names(), vec!["GET", "POST"]);
    }
}
