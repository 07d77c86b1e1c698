use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use bytes::Bytes;
use tokio::{runtime::Handle, sync::oneshot, task::JoinHandle};
use tracing::Instrument;

use crate::{
    blob::Bundle,
    config::CacheConfig,
    engine::{StreamingCallback, StreamingSink},
    writer,
};

/// What happened to the compiled module once compilation finished.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Persistence {
    /// The cached bytes were accepted, so there was nothing to write.
    CacheHit,
    /// The freshly compiled module was written to the cache.
    Written,
    /// Writing to the cache failed. The next load will miss the cache.
    Failed,
    /// The engine never handed over a compiled module to persist.
    Abandoned,
}

/// The write-back started by a [`StreamingBridge`], if the engine has
/// handed over a compiled module yet.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingWrite(Arc<Mutex<Option<JoinHandle<()>>>>);

impl PendingWrite {
    fn set(&self, task: JoinHandle<()>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Wait for a write-back that has already been started. Callbacks that
    /// fire after this point are left to run in the background.
    pub(crate) async fn settle(&self) {
        let task = self.0.lock().unwrap_or_else(PoisonError::into_inner).take();

        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::debug!(
                    error = &e as &dyn std::error::Error,
                    "The write-back didn't run to completion",
                );
            }
        }
    }
}

/// Connects a [`Bundle`] to the engine's [`StreamingSink`] and persists
/// whatever the engine compiles when the cached bytes weren't usable.
#[derive(Debug, Clone)]
pub(crate) struct StreamingBridge {
    config: CacheConfig,
    handle: Handle,
    pending: PendingWrite,
}

impl StreamingBridge {
    pub(crate) fn new(config: CacheConfig, handle: Handle) -> Self {
        StreamingBridge {
            config,
            handle,
            pending: PendingWrite::default(),
        }
    }

    pub(crate) fn pending_write(&self) -> PendingWrite {
        self.pending.clone()
    }

    pub(crate) fn into_callback(self) -> StreamingCallback {
        Box::new(move |bundle: Bundle, sink: &mut dyn StreamingSink| {
            self.drive(bundle, sink)
        })
    }

    fn drive(self, bundle: Bundle, sink: &mut dyn StreamingSink) {
        let parts = bundle.into_parts();

        // The engine needs to see the cached bytes before any source bytes
        let cache_accepted = match parts.cache_bytes {
            Some(cached) => {
                let accepted = sink.set_compiled_module_bytes(cached);
                if !accepted {
                    tracing::debug!(
                        path=%parts.path.display(),
                        "The engine rejected the cached module",
                    );
                }
                accepted
            }
            None => false,
        };

        sink.set_identity(&identity(&parts.path));
        sink.on_bytes_received(&parts.source_bytes);

        if cache_accepted {
            tracing::debug!(path=%parts.path.display(), "Cache hit!");
            sink.finish(None);
            notify(parts.on_validated, Persistence::CacheHit);
            return;
        }

        let StreamingBridge {
            config,
            handle,
            pending,
        } = self;
        let path = parts.path;
        let on_validated = parts.on_validated;
        // The callback may fire on an engine thread, long after this span
        // was exited.
        let span = tracing::Span::current();

        sink.finish(Some(Box::new(move |compiled: Bytes| {
            let write_back = async move {
                let outcome = match writer::write_back(&config, &path, compiled).await {
                    Ok(cache_path) => {
                        tracing::debug!(
                            path=%path.display(),
                            cache_path=%cache_path.display(),
                            "Saved the compiled module",
                        );
                        Persistence::Written
                    }
                    Err(e) => {
                        tracing::warn!(
                            path=%path.display(),
                            error = &e as &dyn std::error::Error,
                            "Unable to save the compiled module to the cache",
                        );
                        Persistence::Failed
                    }
                };

                notify(on_validated, outcome);
            };

            pending.set(handle.spawn(write_back.instrument(span)));
        })));
    }
}

fn notify(hook: Option<oneshot::Sender<Persistence>>, outcome: Persistence) {
    if let Some(hook) = hook {
        // The receiver may have stopped caring
        let _ = hook.send(outcome);
    }
}

/// The name the engine should use for the module in diagnostics.
pub(crate) fn identity(path: &Path) -> String {
    match url::Url::from_file_path(path) {
        Ok(url) => url.to_string(),
        Err(()) => path.display().to_string(),
    }
}
