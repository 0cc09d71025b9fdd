//! # Configuration Module
//!
//! Two pieces of configuration drive the routing core:
//!
//! - [`RouterConfig`] - compile-time knobs for the matcher and the route
//!   cache, loaded from environment variables
//! - [`MiddlewareConfig`] - alias, group, priority and global middleware
//!   tables, usually loaded from a YAML or TOML file
//!
//! ## Environment Variables
//!
//! ### `ROUTELINE_TRAILING_SLASH`
//!
//! `normalize` (default) or `strict`. With `normalize`, a pattern that does
//! not end in `/` also matches the same path with one trailing `/`; a
//! pattern that explicitly ends in `/` still requires it. With `strict`,
//! paths must match the pattern exactly.
//!
//! ### `ROUTELINE_ROUTE_CACHE`
//!
//! Path of the compiled route cache file. Unset or `off` disables caching.
//!
//! ### `ROUTELINE_CHUNK_SIZE`
//!
//! Maximum number of regex alternatives per compiled dispatch group.
//! Default: `16`.
//!
//! ## Middleware file
//!
//! ```yaml
//! aliases:
//!   auth: app::middleware::Authenticate
//!   csrf: app::middleware::VerifyCsrfToken
//! groups:
//!   web: [csrf, session]
//!   admin: [web, auth]
//! priority:
//!   - app::middleware::Authenticate
//!   - app::middleware::VerifyCsrfToken
//! global: [request-id]
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// Default maximum number of alternatives per dispatch group
pub const DEFAULT_CHUNK_SIZE: usize = 16;

/// How trailing slashes in request paths are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingSlash {
    /// Paths must match the pattern byte for byte
    Strict,
    /// `/foo/` matches `/foo`; patterns ending in `/` still require it
    #[default]
    Normalize,
}

impl FromStr for TrailingSlash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(TrailingSlash::Strict),
            "normalize" | "normalise" => Ok(TrailingSlash::Normalize),
            other => Err(format!("unknown trailing slash policy '{}'", other)),
        }
    }
}

impl fmt::Display for TrailingSlash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrailingSlash::Strict => write!(f, "strict"),
            TrailingSlash::Normalize => write!(f, "normalize"),
        }
    }
}

/// Matcher and cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub trailing_slash: TrailingSlash,
    /// Route cache file; `None` selects the null cache
    pub cache_path: Option<PathBuf>,
    /// Maximum number of alternatives per dispatch group
    pub chunk_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            trailing_slash: TrailingSlash::Normalize,
            cache_path: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl RouterConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let trailing_slash = env::var("ROUTELINE_TRAILING_SLASH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.trailing_slash);
        let cache_path = match env::var("ROUTELINE_ROUTE_CACHE") {
            Ok(v) if !v.trim().is_empty() && !v.trim().eq_ignore_ascii_case("off") => {
                Some(PathBuf::from(v.trim()))
            }
            _ => None,
        };
        let chunk_size = env::var("ROUTELINE_CHUNK_SIZE")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.chunk_size);
        Self {
            trailing_slash,
            cache_path,
            chunk_size,
        }
    }

    #[must_use]
    pub fn with_trailing_slash(mut self, policy: TrailingSlash) -> Self {
        self.trailing_slash = policy;
        self
    }

    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

/// Alias, group, priority and global middleware tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiddlewareConfig {
    /// Short name to concrete middleware identifier
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Group name to member entries; members may name other groups
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
    /// Execution order of concrete identifiers, first runs first
    #[serde(default)]
    pub priority: Vec<String>,
    /// Entries applied in front of every route's own middleware
    #[serde(default)]
    pub global: Vec<String>,
}

impl MiddlewareConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn alias(mut self, name: impl Into<String>, concrete: impl Into<String>) -> Self {
        self.aliases.insert(name.into(), concrete.into());
        self
    }

    #[must_use]
    pub fn group<I, S>(mut self, name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .insert(name.into(), members.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn priority<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority = order.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn global<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global = entries.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_yaml_str(source: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(source).context("Failed to parse YAML middleware config")
    }

    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        toml::from_str(source).context("Failed to parse TOML middleware config")
    }

    /// Load from a `yaml`/`yml` or `toml` file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read middleware config {}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&source),
            Some("toml") => Self::from_toml_str(&source),
            _ => bail!(
                "Unsupported middleware config format for {}",
                path.display()
            ),
        }
        .with_context(|| format!("Invalid middleware config {}", path.display()))
    }
}
