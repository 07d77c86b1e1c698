use std::{
    io::Write,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use tempfile::NamedTempFile;

use crate::{config::CacheConfig, CacheError};

/// Persist a freshly compiled module as the cache entry for `source`,
/// returning where it was written.
///
/// The entry is replaced as a whole: the bytes go to a temporary file in
/// the cache root which is then renamed over the old entry, so concurrent
/// readers either see the previous entry or the new one.
#[tracing::instrument(level = "debug", skip_all, fields(path=%source.display(), num_bytes=compiled.len()))]
pub(crate) async fn write_back(
    config: &CacheConfig,
    source: &Path,
    compiled: Bytes,
) -> Result<PathBuf, CacheError> {
    let root = config.cache_root();
    let path = crate::config::entry_path(&root, source);

    // Other writers may be racing us here, which create_dir_all() tolerates
    let dir_error = tokio::fs::create_dir_all(&root).await.err();
    if let Some(e) = &dir_error {
        tracing::warn!(
            dir=%root.display(),
            error = e as &dyn std::error::Error,
            "Unable to create the cache dir",
        );
    }

    let target = path.clone();
    let dir = root.clone();
    let result = tokio::task::spawn_blocking(move || persist(&dir, &target, &compiled)).await?;

    match (result, dir_error) {
        (Ok(()), _) => Ok(path),
        (Err(_), Some(error)) => Err(CacheError::CreateDir { path: root, error }),
        (Err(error), None) => Err(CacheError::Write { path, error }),
    }
}

fn persist(dir: &Path, target: &Path, compiled: &[u8]) -> std::io::Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(compiled)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}
