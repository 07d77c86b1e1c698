use std::path::{Path, PathBuf};

use tokio::{runtime::Handle, sync::oneshot};

use crate::{
    blob::{BlobLoader, Bundle},
    bridge::{Persistence, StreamingBridge},
    config::CacheConfig,
    engine::StreamingEngine,
    LoadError,
};

/// Loads WebAssembly modules from disk, reusing previously compiled
/// artifacts when they are newer than the source file.
///
/// # Examples
///
/// ```rust,ignore
/// use wasmer_file_cache::{CacheConfig, ModuleLoader};
///
/// # async fn run(engine: impl wasmer_file_cache::StreamingEngine) -> Result<(), Box<dyn std::error::Error>> {
/// let loader = ModuleLoader::with_config(engine, CacheConfig::new("/tmp/compiled"));
///
/// // Compile ahead of time and wait for the artifact to hit the disk...
/// loader.precompile_file("app.wasm").await?;
/// // ... so that later loads are served from the cache.
/// let module = loader.load_file("app.wasm").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ModuleLoader<E> {
    engine: E,
    config: CacheConfig,
}

impl<E: StreamingEngine> ModuleLoader<E> {
    /// Create a [`ModuleLoader`] which uses the process-wide
    /// [`CacheConfig::global()`].
    pub fn new(engine: E) -> Self {
        ModuleLoader::with_config(engine, CacheConfig::global())
    }

    pub fn with_config(engine: E, config: CacheConfig) -> Self {
        ModuleLoader { engine, config }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn cache_root(&self) -> PathBuf {
        self.config.cache_root()
    }

    /// Change where compiled modules are stored. Loads that already started
    /// are unaffected.
    pub fn set_cache_root(&self, root: impl Into<PathBuf>) {
        self.config.set_cache_root(root);
    }

    /// Where the compiled form of a (canonical) source path is cached.
    pub fn cache_path(&self, source: &Path) -> PathBuf {
        self.config.locate(source)
    }

    /// Load and compile the module at `path`.
    ///
    /// If the engine had to compile from scratch and handed over the result
    /// before compilation finished, it is written to the cache before this
    /// returns. Results that arrive later (e.g. from tiered compilation) are
    /// written in the background. Problems with the cache are never reported,
    /// only problems with the module itself are.
    #[tracing::instrument(level = "debug", skip_all, fields(path=%path.as_ref().display()))]
    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<E::Module, LoadError> {
        let source = resolve(path.as_ref()).await?;
        let bundle = BlobLoader::new(self.config.clone()).load(&source).await?;

        let bridge = StreamingBridge::new(self.config.clone(), Handle::current());
        let pending = bridge.pending_write();
        let module = self.compile(source, bundle, bridge).await?;
        pending.settle().await;

        Ok(module)
    }

    /// Compile the module at `path` and wait until its compiled form has been
    /// persisted, or the cache was found to already be up to date.
    ///
    /// This only fails for the same reasons [`ModuleLoader::load_file()`]
    /// does. The returned [`Persistence`] says whether the write succeeded.
    #[tracing::instrument(level = "debug", skip_all, fields(path=%path.as_ref().display()))]
    pub async fn precompile_file(&self, path: impl AsRef<Path>) -> Result<Persistence, LoadError> {
        // The write-back is spawned onto this runtime, possibly long after
        // compile_streaming() returned.
        let handle = Handle::current();

        let source = resolve(path.as_ref()).await?;
        let (hook, validated) = oneshot::channel();
        let bundle = BlobLoader::new(self.config.clone())
            .load(&source)
            .await?
            .with_validated_hook(hook);

        let bridge = StreamingBridge::new(self.config.clone(), handle.clone());
        let module = self.compile(source, bundle, bridge).await?;

        // Dropping the module early may cancel the engine's background
        // recompilation before the optimized artifact is handed to us.
        let outcome = validated.await.unwrap_or(Persistence::Abandoned);
        drop(module);
        drop(handle);

        tracing::debug!(?outcome, "Precompiled");
        Ok(outcome)
    }

    async fn compile(
        &self,
        source: PathBuf,
        bundle: Bundle,
        bridge: StreamingBridge,
    ) -> Result<E::Module, LoadError> {
        self.engine
            .compile_streaming(bundle, bridge.into_callback())
            .await
            .map_err(|error| LoadError::Compile {
                path: source,
                error: Box::new(error),
            })
    }
}

async fn resolve(path: &Path) -> Result<PathBuf, LoadError> {
    tokio::fs::canonicalize(path)
        .await
        .map_err(|error| LoadError::Resolve {
            path: path.to_path_buf(),
            error,
        })
}
