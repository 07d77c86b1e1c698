use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use once_cell::sync::Lazy;

use crate::locator::CacheKey;

/// The environment variable used to override the default cache root.
pub const CACHE_DIR_ENV: &str = "WASMER_CACHE_DIR";

static GLOBAL: Lazy<CacheConfig> = Lazy::new(|| {
    let root = default_cache_root();
    tracing::debug!(root=%root.display(), "Using the default cache root");
    CacheConfig::new(root)
});

/// Where compiled modules are stored.
///
/// A [`CacheConfig`] is a shared handle: clones see the same root, and
/// [`CacheConfig::set_cache_root()`] only affects cache paths computed after
/// the call. Loads that already located their entry keep using the old one.
///
/// Most users want the process-wide [`CacheConfig::global()`], while tests
/// and embedders that need isolation can create their own with
/// [`CacheConfig::new()`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    root: Arc<RwLock<PathBuf>>,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CacheConfig {
            root: Arc::new(RwLock::new(root.into())),
        }
    }

    /// The process-wide configuration, initialized from the environment on
    /// first use.
    pub fn global() -> CacheConfig {
        GLOBAL.clone()
    }

    pub fn cache_root(&self) -> PathBuf {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_cache_root(&self, root: impl Into<PathBuf>) {
        let root = root.into();
        tracing::debug!(root=%root.display(), "Changing the cache root");
        *self.root.write().unwrap_or_else(PoisonError::into_inner) = root;
    }

    /// Where the compiled form of `source` lives.
    pub fn locate(&self, source: &Path) -> PathBuf {
        entry_path(&self.cache_root(), source)
    }
}

pub(crate) fn entry_path(root: &Path, source: &Path) -> PathBuf {
    root.join(CacheKey::for_path(source).to_string())
}

/// Work out the OS-convention cache root, respecting `$WASMER_CACHE_DIR`.
pub fn default_cache_root() -> PathBuf {
    resolve_cache_root(std::env::var_os(CACHE_DIR_ENV), dirs::cache_dir())
}

fn resolve_cache_root(env_override: Option<OsString>, platform_dir: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = env_override.filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }

    platform_dir
        .unwrap_or_else(std::env::temp_dir)
        .join("wasmer")
        .join("compiled")
}
