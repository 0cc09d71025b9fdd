//! URL generation, the inverse of matching.
//!
//! Generation walks the route's pattern tokens in order:
//!
//! - literal text is copied as is
//! - a required segment must have a non-empty value
//! - an optional segment without a value is dropped along with its slash
//! - every supplied segment value must satisfy the segment's requirement
//! - keys that name no segment end up in the query string
//!
//! Any path produced here matches back to the same route with the same
//! parameters.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use url::Url;

use crate::error::RouterError;
use crate::route::{PatternToken, Route, RouteCollection};

/// Parameter values for URL generation, kept in insertion order so extra
/// query parameters come out in a predictable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParams(Vec<(String, String)>);

impl UrlParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`UrlParams::insert`]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a value, replacing an earlier one for the same key in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for UrlParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = UrlParams::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

impl From<BTreeMap<String, String>> for UrlParams {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

/// Keys are sorted so the query string does not depend on hash order.
impl From<HashMap<String, String>> for UrlParams {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect::<BTreeMap<_, _>>().into()
    }
}

impl<K: Into<String>, V: ToString, const N: usize> From<[(K, V); N]> for UrlParams {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Builds paths (and absolute URLs) for named routes
#[derive(Debug, Clone)]
pub struct UrlGenerator {
    routes: Arc<RouteCollection>,
    base_url: Option<Url>,
}

impl UrlGenerator {
    #[must_use]
    pub fn new(routes: Arc<RouteCollection>) -> Self {
        Self {
            routes,
            base_url: None,
        }
    }

    /// Base used by [`UrlGenerator::generate_absolute`]
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Generate the path for the route called `name`.
    ///
    /// # Errors
    ///
    /// `RouteNotFound` for an unknown name; `Configuration` for a missing
    /// required value, a value that violates its requirement, or an
    /// optional value supplied while an earlier optional one is missing.
    pub fn generate(&self, name: &str, params: &UrlParams) -> Result<String, RouterError> {
        let route = self
            .routes
            .get(name)
            .ok_or_else(|| RouterError::RouteNotFound(name.to_string()))?;
        generate_for_route(route, params)
    }

    /// Like [`UrlGenerator::generate`], prefixed with the configured base URL
    pub fn generate_absolute(&self, name: &str, params: &UrlParams) -> Result<String, RouterError> {
        let base = self.base_url.as_ref().ok_or_else(|| {
            RouterError::configuration(format!(
                "Cannot generate an absolute URL for route '{}' without a base URL",
                name
            ))
        })?;
        let path = self.generate(name, params)?;
        let mut absolute = String::with_capacity(base.as_str().len() + path.len());
        absolute.push_str(base.origin().ascii_serialization().as_str());
        absolute.push_str(base.path().trim_end_matches('/'));
        absolute.push_str(&path);
        Ok(absolute)
    }
}

fn check_value(route: &Route, segment: &str, value: &str) -> Result<(), RouterError> {
    if route.satisfies_requirement(segment, value) {
        return Ok(());
    }
    let expected = route
        .requirements()
        .get(segment)
        .map(String::as_str)
        .unwrap_or_default();
    Err(RouterError::configuration(format!(
        "Value '{}' for segment '{}' of route '{}' does not match the required pattern '{}'",
        value,
        segment,
        route.name(),
        expected
    )))
}

/// Generate a path for an already resolved route
pub fn generate_for_route(route: &Route, params: &UrlParams) -> Result<String, RouterError> {
    let mut path = String::with_capacity(route.pattern().len() + 16);
    let mut omitted: Option<&str> = None;

    for token in &route.compiled().tokens {
        match token {
            PatternToken::Static(text) => path.push_str(text),
            PatternToken::Required(segment) => {
                let value = params
                    .get(segment)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| {
                        RouterError::configuration(format!(
                            "Missing required segment '{}' for route '{}'",
                            segment,
                            route.name()
                        ))
                    })?;
                check_value(route, segment, value)?;
                path.push_str(&urlencoding::encode(value));
            }
            PatternToken::Optional(segment) => {
                match params.get(segment).filter(|v| !v.is_empty()) {
                    None => {
                        omitted.get_or_insert(segment.as_str());
                    }
                    Some(value) => {
                        if let Some(missing) = omitted {
                            return Err(RouterError::configuration(format!(
                                "Optional segment '{}' of route '{}' cannot be set while '{}' is missing",
                                segment,
                                route.name(),
                                missing
                            )));
                        }
                        check_value(route, segment, value)?;
                        path.push('/');
                        path.push_str(&urlencoding::encode(value));
                    }
                }
            }
        }
    }

    if path.is_empty() {
        path.push('/');
    }

    let segments = route.segment_names();
    let mut extra = params
        .iter()
        .filter(|(key, _)| !segments.iter().any(|s| s == key))
        .peekable();
    if extra.peek().is_some() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(extra)
            .finish();
        path.push('?');
        path.push_str(&query);
    }

    Ok(path)
}
