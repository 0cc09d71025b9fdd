//! Error taxonomy for route definition, compilation, generation and caching.
//!
//! Build-time variants (`InvalidPattern`, `DuplicateRouteName`,
//! `DuplicateMiddleware`, `DuplicateRequirement`, `Configuration`) abort
//! compilation. `RouteNotFound` is returned to whoever asked for an unknown
//! name. `CacheCorrupt` never leaves the [`crate::cache`] module in normal
//! operation: the cache falls back to a fresh build instead.
//!
//! "No route matched" and "method not allowed" are not errors; see
//! [`crate::router::RoutingResult`].

use std::fmt;

/// Error raised while defining, compiling, generating or caching routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// Malformed route pattern
    ///
    /// Missing leading slash, duplicate segment names, an optional segment
    /// followed by other content, or an invalid requirement regex.
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Human readable reason
        reason: String,
    },
    /// Two routes registered under the same name
    DuplicateRouteName(String),
    /// The same middleware identifier was attached twice to one route
    DuplicateMiddleware {
        /// Route name
        route: String,
        /// Identifier (the part before `:`)
        middleware: String,
    },
    /// A requirement was declared twice for the same segment
    DuplicateRequirement {
        /// Route name
        route: String,
        /// Segment name
        segment: String,
    },
    /// Lookup of an unknown route name
    RouteNotFound(String),
    /// Misconfiguration detected while resolving middleware, handlers or
    /// generating a URL
    Configuration(String),
    /// Cached payload could not be turned back into routes
    CacheCorrupt(String),
}

impl RouterError {
    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        RouterError::Configuration(message.into())
    }

    /// `true` for errors that indicate a programming error in route or
    /// middleware definitions.
    #[must_use]
    pub fn is_build_error(&self) -> bool {
        !matches!(
            self,
            RouterError::RouteNotFound(_) | RouterError::CacheCorrupt(_)
        )
    }
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid route pattern '{}': {}", pattern, reason)
            }
            RouterError::DuplicateRouteName(name) => {
                write!(f, "Duplicate route name '{}'", name)
            }
            RouterError::DuplicateMiddleware { route, middleware } => write!(
                f,
                "Middleware '{}' was added twice to route '{}'",
                middleware, route
            ),
            RouterError::DuplicateRequirement { route, segment } => write!(
                f,
                "Requirement for segment '{}' of route '{}' is already set",
                segment, route
            ),
            RouterError::RouteNotFound(name) => {
                write!(f, "There is no route with name '{}'", name)
            }
            RouterError::Configuration(message) => write!(f, "{}", message),
            RouterError::CacheCorrupt(message) => {
                write!(f, "Route cache is corrupt: {}", message)
            }
        }
    }
}

impl std::error::Error for RouterError {}
