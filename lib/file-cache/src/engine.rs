use std::{fmt::Debug, ops::Deref};

use bytes::Bytes;

use crate::blob::Bundle;

/// Invoked by the engine with the serialized form of a freshly compiled
/// module.
///
/// Engines with tiered compilation may call this long after
/// [`StreamingEngine::compile_streaming()`] returned, and from any thread.
pub type CompiledCallback = Box<dyn FnOnce(Bytes) + Send + 'static>;

/// Feeds a [`Bundle`] into a [`StreamingSink`].
pub type StreamingCallback = Box<dyn FnOnce(Bundle, &mut dyn StreamingSink) + Send + 'static>;

/// The receiving end of a streaming compilation.
///
/// Callers are expected to drive a sink in a fixed order: offer any
/// previously compiled bytes, set the identity, feed the module's bytes, and
/// finally call [`StreamingSink::finish()`] exactly once.
pub trait StreamingSink: Send {
    /// Offer previously compiled bytes, returning `true` if the engine
    /// accepted them and will use them instead of compiling from scratch.
    fn set_compiled_module_bytes(&mut self, bytes: Bytes) -> bool;

    /// A human-readable identity used for diagnostics (e.g. stack traces).
    fn set_identity(&mut self, identity: &str);

    /// Receive (part of) the WebAssembly binary.
    fn on_bytes_received(&mut self, bytes: &[u8]);

    /// Signal that all bytes have been delivered.
    ///
    /// If `on_compiled` is provided, the engine will call it with the
    /// serialized module once compilation has produced something worth
    /// persisting. It may also drop it without calling it.
    fn finish(&mut self, on_compiled: Option<CompiledCallback>);
}

/// A WebAssembly engine with a streaming compilation entry point.
///
/// ## Protocol
///
/// [`StreamingEngine::compile_streaming()`] must create a fresh
/// [`StreamingSink`], invoke `callback` with the bundle and that sink exactly
/// once, and then resolve to the module described by the sink's state.
#[async_trait::async_trait]
pub trait StreamingEngine: Debug + Send + Sync {
    /// The compiled artifact.
    type Module: Send + Sync + 'static;
    /// Why a module couldn't be compiled.
    type Error: std::error::Error + Send + Sync + 'static;

    async fn compile_streaming(
        &self,
        bundle: Bundle,
        callback: StreamingCallback,
    ) -> Result<Self::Module, Self::Error>;
}

#[async_trait::async_trait]
impl<D, E> StreamingEngine for D
where
    D: Deref<Target = E> + Debug + Send + Sync,
    E: StreamingEngine + ?Sized,
{
    type Module = E::Module;
    type Error = E::Error;

    async fn compile_streaming(
        &self,
        bundle: Bundle,
        callback: StreamingCallback,
    ) -> Result<Self::Module, Self::Error> {
        (**self).compile_streaming(bundle, callback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_is_object_safe() {
        let _: Option<Box<dyn StreamingSink>> = None;
    }
}
