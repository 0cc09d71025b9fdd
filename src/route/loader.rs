//! Route definition files.
//!
//! Routes can be declared in YAML, TOML or JSON instead of code. Top level
//! routes are registered first, then groups in file order.
//!
//! ```yaml
//! namespace: app::http
//! routes:
//!   - name: home
//!     path: /
//!     handler: HomeController@index
//!   - name: users.show
//!     methods: [GET, HEAD]
//!     path: /users/{id}/{tab?}
//!     handler: UserController@show
//!     middleware: [auth]
//!     requirements: { id: "[0-9]+" }
//!     defaults: { tab: profile }
//! groups:
//!   - prefix: /admin
//!     name_prefix: admin.
//!     middleware: [auth, "can:admin"]
//!     routes:
//!       - name: dashboard
//!         path: /
//!         handler: DashboardController@index
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::collection::RouteCollection;
use super::registrar::{GroupAttributes, RouteRegistrar};
use super::route::MethodSet;
use crate::error::RouterError;

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

/// Root of a route definition file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteFile {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
}

/// One route in a definition file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    pub path: String,
    pub handler: String,
    #[serde(default)]
    pub middleware: Vec<String>,
    #[serde(default)]
    pub requirements: BTreeMap<String, String>,
    #[serde(default)]
    pub defaults: BTreeMap<String, Value>,
}

/// A group of routes sharing prefix, namespace, name prefix and middleware
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupEntry {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub name_prefix: String,
    #[serde(default)]
    pub middleware: Vec<String>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
}

fn scalar_to_string(key: &str, value: &Value) -> Result<String, RouterError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(RouterError::configuration(format!(
            "Default '{}' must be a string, number or boolean",
            key
        ))),
    }
}

fn register_entry(registrar: &mut RouteRegistrar, entry: &RouteEntry) -> Result<(), RouterError> {
    let methods = MethodSet::parse(&entry.methods)?;
    let mut defaults = Vec::with_capacity(entry.defaults.len());
    for (key, value) in &entry.defaults {
        defaults.push((key.as_str(), scalar_to_string(key, value)?));
    }
    registrar
        .add(methods, &entry.name, &entry.path, entry.handler.as_str())?
        .middleware(&entry.middleware)?
        .requirements(&entry.requirements)?
        .defaults(defaults);
    Ok(())
}

fn register_group(registrar: &mut RouteRegistrar, group: &GroupEntry) -> Result<(), RouterError> {
    let mut attributes = GroupAttributes::new()
        .prefix(group.prefix.clone())
        .name_prefix(group.name_prefix.clone())
        .middleware(group.middleware.iter().cloned());
    if let Some(ns) = &group.namespace {
        attributes = attributes.namespace(ns.clone());
    }
    registrar.group(attributes, |r| {
        for entry in &group.routes {
            register_entry(r, entry)?;
        }
        for nested in &group.groups {
            register_group(r, nested)?;
        }
        Ok(())
    })
}

impl RouteFile {
    /// Turn the file into a route collection
    pub fn into_collection(self) -> Result<RouteCollection, RouterError> {
        let mut registrar = match &self.namespace {
            Some(ns) => RouteRegistrar::with_namespace(ns.clone()),
            None => RouteRegistrar::new(),
        };
        for entry in &self.routes {
            register_entry(&mut registrar, entry)?;
        }
        for group in &self.groups {
            register_group(&mut registrar, group)?;
        }
        registrar.into_collection()
    }
}

/// Parse a YAML route file
pub fn parse_routes_yaml(source: &str) -> anyhow::Result<RouteCollection> {
    let file: RouteFile = serde_yaml::from_str(source).context("Failed to parse YAML route file")?;
    Ok(file.into_collection()?)
}

/// Parse a TOML route file
pub fn parse_routes_toml(source: &str) -> anyhow::Result<RouteCollection> {
    let file: RouteFile = toml::from_str(source).context("Failed to parse TOML route file")?;
    Ok(file.into_collection()?)
}

/// Parse a JSON route file
pub fn parse_routes_json(source: &str) -> anyhow::Result<RouteCollection> {
    let file: RouteFile = serde_json::from_str(source).context("Failed to parse JSON route file")?;
    Ok(file.into_collection()?)
}

/// Load a route file, picking the format from the extension
/// (`yaml`/`yml`, `toml` or `json`).
pub fn load_routes(path: impl AsRef<Path>) -> anyhow::Result<RouteCollection> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read route file {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let routes = match ext.as_str() {
        "yaml" | "yml" => parse_routes_yaml(&source),
        "toml" => parse_routes_toml(&source),
        "json" => parse_routes_json(&source),
        other => bail!(
            "Unsupported route file extension '{}' for {}",
            other,
            path.display()
        ),
    }
    .with_context(|| format!("Invalid route file {}", path.display()))?;

    info!(
        path = %path.display(),
        routes_count = routes.len(),
        "Route file loaded"
    );
    Ok(routes)
}
