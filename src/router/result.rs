use std::collections::BTreeMap;
use std::sync::Arc;

use http::Method;

use crate::route::Route;

/// A matched route and the values captured from the path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// The matched route (Arc to avoid cloning route metadata per request)
    pub route: Arc<Route>,
    /// Decoded segment values, plus route defaults for keys not captured
    pub params: BTreeMap<String, String>,
}

impl RouteMatch {
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Outcome of matching a `(method, path)` pair.
///
/// `NoMatch` maps to 404 and `MethodNotAllowed` to 405; neither is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingResult {
    Matched(RouteMatch),
    NoMatch,
    /// The path matched, but only for these methods
    MethodNotAllowed(Vec<Method>),
}

impl RoutingResult {
    #[must_use]
    pub fn is_match(&self) -> bool {
        matches!(self, RoutingResult::Matched(_))
    }

    #[must_use]
    pub fn route(&self) -> Option<&Arc<Route>> {
        match self {
            RoutingResult::Matched(m) => Some(&m.route),
            _ => None,
        }
    }

    /// Captured params; empty unless matched
    #[must_use]
    pub fn params(&self) -> BTreeMap<String, String> {
        match self {
            RoutingResult::Matched(m) => m.params.clone(),
            _ => BTreeMap::new(),
        }
    }

    /// Methods that would have matched; empty unless `MethodNotAllowed`
    #[must_use]
    pub fn allowed_methods(&self) -> &[Method] {
        match self {
            RoutingResult::MethodNotAllowed(methods) => methods,
            _ => &[],
        }
    }

    /// Value for an `Allow` header, e.g. `GET, HEAD, POST`
    #[must_use]
    pub fn allow_header(&self) -> Option<String> {
        match self {
            RoutingResult::MethodNotAllowed(methods) => Some(
                methods
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            _ => None,
        }
    }

    /// Status code a transport layer would send for this result
    #[must_use]
    pub fn status_hint(&self) -> u16 {
        match self {
            RoutingResult::Matched(_) => 200,
            RoutingResult::NoMatch => 404,
            RoutingResult::MethodNotAllowed(_) => 405,
        }
    }

    #[must_use]
    pub fn into_match(self) -> Option<RouteMatch> {
        match self {
            RoutingResult::Matched(m) => Some(m),
            _ => None,
        }
    }
}
