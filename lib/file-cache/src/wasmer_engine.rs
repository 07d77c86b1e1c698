//! A [`StreamingEngine`] backed by the Wasmer runtime.

use bytes::Bytes;
use wasmer::{Engine, Module};

use crate::{
    blob::Bundle,
    engine::{CompiledCallback, StreamingCallback, StreamingEngine, StreamingSink},
};

/// Compiles modules with a [`wasmer::Engine`], using
/// [`Module::serialize()`] output as the cached representation.
#[derive(Debug, Clone, Default)]
pub struct WasmerEngine {
    engine: Engine,
}

impl WasmerEngine {
    pub fn new(engine: Engine) -> Self {
        WasmerEngine { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WasmerError {
    #[error("Unable to compile the WebAssembly module")]
    Compile(#[from] wasmer::CompileError),
    #[error("A spawned task didn't run to completion")]
    Join(#[from] tokio::task::JoinError),
}

struct WasmerSink {
    engine: Engine,
    cached: Option<Module>,
    identity: Option<String>,
    wasm: Vec<u8>,
    on_compiled: Option<CompiledCallback>,
}

impl WasmerSink {
    fn new(engine: Engine) -> Self {
        WasmerSink {
            engine,
            cached: None,
            identity: None,
            wasm: Vec::new(),
            on_compiled: None,
        }
    }
}

impl StreamingSink for WasmerSink {
    fn set_compiled_module_bytes(&mut self, bytes: Bytes) -> bool {
        match Module::deserialize_checked(&self.engine, bytes.to_vec()) {
            Ok(module) => {
                self.cached = Some(module);
                true
            }
            Err(e) => {
                tracing::debug!(
                    error = &e as &dyn std::error::Error,
                    "Unable to deserialize the cached module",
                );
                false
            }
        }
    }

    fn set_identity(&mut self, identity: &str) {
        self.identity = Some(identity.to_string());
    }

    fn on_bytes_received(&mut self, bytes: &[u8]) {
        self.wasm.extend_from_slice(bytes);
    }

    fn finish(&mut self, on_compiled: Option<CompiledCallback>) {
        self.on_compiled = on_compiled;
    }
}

#[async_trait::async_trait]
impl StreamingEngine for WasmerEngine {
    type Module = Module;
    type Error = WasmerError;

    async fn compile_streaming(
        &self,
        bundle: Bundle,
        callback: StreamingCallback,
    ) -> Result<Module, WasmerError> {
        let mut sink = WasmerSink::new(self.engine.clone());
        callback(bundle, &mut sink);

        let WasmerSink {
            cached,
            identity,
            wasm,
            on_compiled,
            ..
        } = sink;

        let mut module = match cached {
            Some(module) => module,
            None => {
                let engine = self.engine.clone();
                tokio::task::spawn_blocking(move || Module::new(&engine, &wasm)).await??
            }
        };

        if let Some(identity) = &identity {
            module.set_name(identity);
        }

        if let Some(on_compiled) = on_compiled {
            match module.serialize() {
                Ok(serialized) => on_compiled(serialized),
                Err(e) => {
                    tracing::warn!(
                        error = &e as &dyn std::error::Error,
                        "Unable to serialize the compiled module",
                    );
                }
            }
        }

        Ok(module)
    }
}
