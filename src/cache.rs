//! # Route Cache
//!
//! Compiling a large route set is the one expensive step of building a
//! router, so its output can be persisted and reloaded on the next start.
//!
//! The cached payload is pure data: the [`CompiledDispatch`] plus a
//! [`RouteData`] snapshot of every route in registration order. Handlers are
//! stored as [`crate::route::HandlerRef`] identifiers and are resolved again
//! after loading.
//!
//! ## File format
//!
//! ```json
//! {
//!   "format_version": 2,
//!   "checksum": "<sha256 of the serialized payload>",
//!   "payload": { "dispatch": { ... }, "routes": [ ... ] }
//! }
//! ```
//!
//! The same route set always serializes to the same bytes. Writes go to a
//! temporary file in the target directory which is then renamed over the
//! cache file, so readers never observe a partial write.
//!
//! Invalidation is the caller's job: delete the file (or call
//! [`FileRouteCache::clear`]) when route definitions change.
//!
//! ## Failure handling
//!
//! A missing cache triggers a build. A corrupt cache (bad JSON, unknown
//! format version, checksum mismatch) is logged at `warn` and also
//! triggers a build. Failing to write the cache is logged and otherwise
//! ignored.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::RouterError;
use crate::route::RouteData;
use crate::router::CompiledDispatch;

/// Bumped whenever the payload layout changes
pub const CACHE_FORMAT_VERSION: u32 = 2;

/// Everything needed to rebuild a router without running route definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledRoutes {
    pub dispatch: CompiledDispatch,
    /// Routes in registration order
    pub routes: Vec<RouteData>,
}

/// Builder invoked on a cache miss
pub type BuildFn<'a> = dyn FnMut() -> Result<CompiledRoutes, RouterError> + 'a;

/// Storage for compiled routes
pub trait RouteCache: Send + Sync {
    /// Cached routes, or `None` when missing or unusable
    fn load(&self) -> Option<CompiledRoutes>;

    /// Persist compiled routes
    fn store(&self, compiled: &CompiledRoutes) -> anyhow::Result<()>;

    /// Drop whatever is cached
    fn clear(&self) -> anyhow::Result<()>;

    /// Return cached routes if present and valid, otherwise run `build`,
    /// persist its result and return it.
    ///
    /// Only errors from `build` are returned; cache failures fall back to
    /// building.
    fn get(&self, build: &mut BuildFn<'_>) -> Result<CompiledRoutes, RouterError> {
        if let Some(compiled) = self.load() {
            return Ok(compiled);
        }
        let compiled = build()?;
        if let Err(e) = self.store(&compiled) {
            warn!(error = %format!("{:#}", e), "Failed to write route cache");
        }
        Ok(compiled)
    }
}

/// Cache that never holds anything; every `get` builds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRouteCache;

impl RouteCache for NullRouteCache {
    fn load(&self) -> Option<CompiledRoutes> {
        None
    }

    fn store(&self, _compiled: &CompiledRoutes) -> anyhow::Result<()> {
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    format_version: u32,
    checksum: String,
    payload: CompiledRoutes,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Serialize a payload the way it is checksummed
fn payload_bytes(compiled: &CompiledRoutes) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(compiled)
}

/// Decode and verify a cache file
pub fn decode_cache(bytes: &[u8]) -> Result<CompiledRoutes, RouterError> {
    let file: CacheFile = serde_json::from_slice(bytes)
        .map_err(|e| RouterError::CacheCorrupt(format!("invalid cache payload: {}", e)))?;
    if file.format_version != CACHE_FORMAT_VERSION {
        return Err(RouterError::CacheCorrupt(format!(
            "format version {} is not supported (expected {})",
            file.format_version, CACHE_FORMAT_VERSION
        )));
    }
    let bytes = payload_bytes(&file.payload)
        .map_err(|e| RouterError::CacheCorrupt(e.to_string()))?;
    let checksum = sha256_hex(&bytes);
    if checksum != file.checksum {
        return Err(RouterError::CacheCorrupt(format!(
            "checksum mismatch (stored {}, computed {})",
            file.checksum, checksum
        )));
    }
    Ok(file.payload)
}

/// Encode compiled routes into the cache file format
pub fn encode_cache(compiled: &CompiledRoutes) -> anyhow::Result<Vec<u8>> {
    let bytes = payload_bytes(compiled).context("Failed to serialize compiled routes")?;
    let file = CacheFile {
        format_version: CACHE_FORMAT_VERSION,
        checksum: sha256_hex(&bytes),
        payload: compiled.clone(),
    };
    serde_json::to_vec_pretty(&file).context("Failed to serialize route cache")
}

/// JSON file cache with atomic replacement
#[derive(Debug, Clone)]
pub struct FileRouteCache {
    path: PathBuf,
}

impl FileRouteCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RouteCache for FileRouteCache {
    fn load(&self) -> Option<CompiledRoutes> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Route cache miss");
                return None;
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Route cache unreadable, rebuilding"
                );
                return None;
            }
        };
        match decode_cache(&bytes) {
            Ok(compiled) => {
                info!(
                    path = %self.path.display(),
                    routes_count = compiled.routes.len(),
                    "Route cache loaded"
                );
                Some(compiled)
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Route cache corrupt, rebuilding"
                );
                None
            }
        }
    }

    fn store(&self, compiled: &CompiledRoutes) -> anyhow::Result<()> {
        let bytes = encode_cache(compiled)?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&bytes)
            .context("Failed to write route cache")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to sync route cache")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace route cache {}", self.path.display()))?;
        info!(
            path = %self.path.display(),
            routes_count = compiled.routes.len(),
            bytes = bytes.len(),
            "Route cache written"
        );
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove route cache {}", self.path.display())),
        }
    }
}
