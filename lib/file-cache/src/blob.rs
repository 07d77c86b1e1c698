use std::{
    fmt::{self, Debug, Formatter},
    fs::Metadata,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::SystemTime,
};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::{bridge::Persistence, config::CacheConfig, LoadError};

/// Everything needed to compile one module: the source and, if it is still
/// fresh, the module's previously compiled form.
pub struct Bundle {
    path: PathBuf,
    source_metadata: Metadata,
    source_bytes: Bytes,
    cache_bytes: Option<Bytes>,
    pub(crate) on_validated: Option<oneshot::Sender<Persistence>>,
}

impl Bundle {
    /// The canonical path of the source module.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source_metadata(&self) -> &Metadata {
        &self.source_metadata
    }

    pub fn source_bytes(&self) -> &Bytes {
        &self.source_bytes
    }

    /// The cached compiled bytes, only present when the cache entry was
    /// written after the source was last modified.
    pub fn cache_bytes(&self) -> Option<&Bytes> {
        self.cache_bytes.as_ref()
    }

    /// Register a hook that is notified once persisting the compiled module
    /// has been attempted, or was found to be unnecessary.
    pub(crate) fn with_validated_hook(mut self, hook: oneshot::Sender<Persistence>) -> Self {
        self.on_validated = Some(hook);
        self
    }

    pub(crate) fn into_parts(self) -> BundleParts {
        BundleParts {
            path: self.path,
            source_bytes: self.source_bytes,
            cache_bytes: self.cache_bytes,
            on_validated: self.on_validated,
        }
    }
}

impl Debug for Bundle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("path", &self.path)
            .field("source_bytes", &self.source_bytes.len())
            .field("cache_bytes", &self.cache_bytes.as_ref().map(Bytes::len))
            .field("on_validated", &self.on_validated.is_some())
            .finish()
    }
}

pub(crate) struct BundleParts {
    pub(crate) path: PathBuf,
    pub(crate) source_bytes: Bytes,
    pub(crate) cache_bytes: Option<Bytes>,
    pub(crate) on_validated: Option<oneshot::Sender<Persistence>>,
}

/// Reads a source module and its cache entry side by side.
#[derive(Debug, Clone)]
pub struct BlobLoader {
    config: CacheConfig,
}

impl BlobLoader {
    pub fn new(config: CacheConfig) -> Self {
        BlobLoader { config }
    }

    /// Read `source` and, opportunistically, its cache entry.
    ///
    /// Failing to read the source is an error. Failing to read the cache
    /// entry, or finding one that isn't strictly newer than the source, just
    /// means the [`Bundle`] won't carry any cached bytes.
    ///
    /// The path is expected to already be canonical.
    #[tracing::instrument(level = "debug", skip_all, fields(path=%source.display()))]
    pub async fn load(&self, source: &Path) -> Result<Bundle, LoadError> {
        let cache_path = self.config.locate(source);

        let (source_blob, cached) = tokio::join!(read_source(source), read_cached(&cache_path));
        let (source_metadata, source_bytes) = source_blob?;

        let cache_bytes = cached.and_then(|entry| fresh_bytes(&source_metadata, entry));

        Ok(Bundle {
            path: source.to_path_buf(),
            source_metadata,
            source_bytes,
            cache_bytes,
            on_validated: None,
        })
    }
}

struct CachedEntry {
    path: PathBuf,
    modified: SystemTime,
    bytes: Bytes,
}

fn fresh_bytes(source_metadata: &Metadata, entry: CachedEntry) -> Option<Bytes> {
    let source_modified = match source_metadata.modified() {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(
                error = &e as &dyn std::error::Error,
                "Unable to determine when the source was modified",
            );
            return None;
        }
    };

    if entry.modified > source_modified {
        tracing::debug!(cache_path=%entry.path.display(), "Found a fresh cache entry");
        Some(entry.bytes)
    } else {
        tracing::debug!(cache_path=%entry.path.display(), "Ignoring a stale cache entry");
        None
    }
}

async fn read_source(path: &Path) -> Result<(Metadata, Bytes), LoadError> {
    let read_error = |error| LoadError::Read {
        path: path.to_path_buf(),
        error,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(read_error)?;
    let bytes = tokio::fs::read(path).await.map_err(read_error)?;

    Ok((metadata, bytes.into()))
}

async fn read_cached(path: &Path) -> Option<CachedEntry> {
    match try_read_cached(path).await {
        Ok(entry) => Some(entry),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::trace!(cache_path=%path.display(), "Cache miss");
            None
        }
        Err(e) => {
            tracing::debug!(
                cache_path=%path.display(),
                error = &e as &dyn std::error::Error,
                "Unable to read the cache entry",
            );
            None
        }
    }
}

async fn try_read_cached(path: &Path) -> std::io::Result<CachedEntry> {
    let metadata = tokio::fs::metadata(path).await?;
    let modified = metadata.modified()?;
    let bytes = tokio::fs::read(path).await?;

    Ok(CachedEntry {
        path: path.to_path_buf(),
        modified,
        bytes: bytes.into(),
    })
}
