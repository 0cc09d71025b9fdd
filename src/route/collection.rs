use std::collections::HashMap;
use std::sync::Arc;

use super::route::{Route, RouteData};
use crate::error::RouterError;

/// Ordered registry of routes keyed by unique name.
///
/// Registration order is preserved; it decides which route wins when two
/// patterns could match the same path.
#[derive(Debug, Clone, Default)]
pub struct RouteCollection {
    routes: Vec<Arc<Route>>,
    by_name: HashMap<String, usize>,
}

impl RouteCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Fails if the name is already taken.
    pub fn add(&mut self, route: Route) -> Result<(), RouterError> {
        if self.by_name.contains_key(route.name()) {
            return Err(RouterError::DuplicateRouteName(route.name().to_string()));
        }
        self.by_name.insert(route.name().to_string(), self.routes.len());
        self.routes.push(Arc::new(route));
        Ok(())
    }

    /// Rebuild a collection from cached route data.
    pub fn hydrate<I>(data: I) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = RouteData>,
    {
        let mut collection = Self::new();
        for route in data {
            collection.add(Route::hydrate(route)?)?;
        }
        Ok(collection)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Route>> {
        self.by_name.get(name).map(|&idx| &self.routes[idx])
    }

    /// Registration index of a route
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Serialisable snapshot in registration order
    #[must_use]
    pub fn to_data(&self) -> Vec<RouteData> {
        self.routes.iter().map(|r| r.to_data()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{HandlerRef, MethodSet};

    fn route(name: &str, pattern: &str) -> Route {
        Route::new(
            MethodSet::parse(["GET"]).unwrap(),
            name,
            pattern,
            HandlerRef::function("h"),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut c = RouteCollection::new();
        c.add(route("home", "/")).unwrap();
        let err = c.add(route("home", "/welcome")).unwrap_err();
        assert_eq!(err, RouterError::DuplicateRouteName("home".into()));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_registration_order_kept() {
        let mut c = RouteCollection::new();
        c.add(route("b", "/b")).unwrap();
        c.add(route("a", "/a")).unwrap();
        let names: Vec<_> = c.iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(c.index_of("a"), Some(1));
        assert_eq!(c.get("b").unwrap().pattern(), "/b");
    }
}
