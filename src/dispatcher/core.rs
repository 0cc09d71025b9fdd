//! Request and response values passed through middleware pipelines.
//!
//! Parameters and headers use `SmallVec` so typical requests (up to 8
//! params, up to 16 headers) stay off the heap. Names are `Arc<str>`, which
//! makes cloning a request cheap.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use http::Method;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use smallvec::SmallVec;

use crate::route::HandlerRef;
use crate::router::RouteMatch;

/// Maximum number of path/query parameters before heap allocation
pub const MAX_INLINE_PARAMS: usize = 8;

/// Maximum inline headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Parameter storage; names are shared, values are per request
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Header storage; lookups are case-insensitive
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Request identifier backed by a ULID
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(pub ulid::Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Parse an incoming header value, generating a fresh id when it is
    /// missing or not a ULID.
    #[must_use]
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.trim().parse::<RequestId>().ok())
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RequestId(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<RequestId>()
            .map_err(|_| serde::de::Error::custom("invalid request id"))
    }
}

/// A request travelling through a middleware pipeline
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub request_id: RequestId,
    pub method: Method,
    /// Path without query string
    pub path: String,
    /// Name of the matched route, once routing has happened
    pub route_name: Option<String>,
    /// Handler of the matched route
    pub handler: Option<HandlerRef>,
    /// Decoded path parameters (plus route defaults)
    pub path_params: ParamVec,
    pub query_params: ParamVec,
    pub headers: HeaderVec,
    pub body: Option<Value>,
    /// Values attached by middleware for later middleware and the handler
    pub attributes: BTreeMap<String, Value>,
}

impl HandlerRequest {
    /// Build a request from a method and a request target such as
    /// `/users/5?tab=posts`. Query values are decoded.
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        let query_params = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (Arc::<str>::from(&*k), v.into_owned()))
            .collect();
        Self {
            request_id: RequestId::new(),
            method,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            route_name: None,
            handler: None,
            path_params: ParamVec::new(),
            query_params,
            headers: HeaderVec::new(),
            body: None,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Record the routing outcome on the request
    pub fn apply_match(&mut self, route_match: &RouteMatch) {
        self.route_name = Some(route_match.route.name().to_string());
        self.handler = Some(route_match.route.handler().clone());
        self.path_params = route_match
            .params
            .iter()
            .map(|(k, v)| (Arc::from(k.as_str()), v.clone()))
            .collect();
    }

    /// Get a path parameter by name
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a query parameter by name; the last occurrence wins
    #[inline]
    #[must_use]
    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    /// Note: This allocates - use get_path_param() in hot paths
    #[must_use]
    pub fn path_params_map(&self) -> HashMap<String, String> {
        self.path_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

/// Response produced by a handler or a short-circuiting middleware
#[derive(Debug, Clone, Serialize)]
pub struct HandlerResponse {
    pub status: u16,
    #[serde(skip_serializing)]
    pub headers: HeaderVec,
    pub body: Value,
}

impl HandlerResponse {
    #[must_use]
    pub fn new(status: u16, headers: HeaderVec, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// JSON response with a `content-type` header
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_string()));
        Self {
            status,
            headers,
            body,
        }
    }

    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": message }))
    }

    /// Redirect to `location`
    #[must_use]
    pub fn redirect(status: u16, location: &str) -> Self {
        let mut resp = Self::new(status, HeaderVec::new(), Value::Null);
        resp.set_header("location", location.to_string());
        resp
    }

    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }
}
