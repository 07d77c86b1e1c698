use std::path::PathBuf;

/// Errors that may be returned when loading a module through the cache.
///
/// Only problems with the source module itself are reported. Anything that
/// goes wrong while reading or writing the cache degrades to a cache miss.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("Unable to resolve \"{}\"", path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("Unable to read \"{}\"", path.display())]
    Read {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("Unable to compile \"{}\"", path.display())]
    Compile {
        path: PathBuf,
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl LoadError {
    /// The file this error is about.
    pub fn path(&self) -> &std::path::Path {
        match self {
            LoadError::Resolve { path, .. }
            | LoadError::Read { path, .. }
            | LoadError::Compile { path, .. } => path,
        }
    }
}

/// Possible errors that may occur while persisting compiled bytes.
///
/// These never cross the public load API. They are logged where the write
/// is triggered and otherwise only show up as a cache miss next time.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Unable to create the cache dir \"{}\"", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("Unable to write to \"{}\"", path.display())]
    Write {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("The background write didn't run to completion")]
    Join(#[from] tokio::task::JoinError),
}
