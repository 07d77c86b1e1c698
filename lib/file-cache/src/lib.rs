//! The `wasmer-file-cache` crate compiles WebAssembly modules from local
//! files and keeps their compiled form on disk, so later loads of an
//! unchanged file can skip compilation.
//!
//! ## How it works
//!
//! Each source file gets one cache entry, named after the SHA-256 hash of
//! its canonical path and stored in the [cache root](CacheConfig). An entry
//! is only offered to the engine when it was written after the source file
//! was last modified. The engine always receives the source bytes as well,
//! and whenever it had to compile from scratch the new artifact is written
//! back to the cache.
//!
//! Anything that goes wrong with the cache (missing, stale, corrupt or
//! unwritable entries) quietly degrades to compiling from source.
//!
//! The engine itself is abstracted behind [`StreamingEngine`]. Enable the
//! `wasmer` feature for an implementation backed by the Wasmer runtime.

#![warn(unused_import_braces)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod blob;
mod bridge;
mod config;
mod engine;
mod error;
mod loader;
mod locator;
#[cfg(feature = "wasmer")]
mod wasmer_engine;
mod writer;

pub use crate::{
    blob::{BlobLoader, Bundle},
    bridge::Persistence,
    config::{default_cache_root, CacheConfig, CACHE_DIR_ENV},
    engine::{CompiledCallback, StreamingCallback, StreamingEngine, StreamingSink},
    error::LoadError,
    loader::ModuleLoader,
    locator::CacheKey,
};

pub(crate) use crate::error::CacheError;

#[cfg(feature = "wasmer")]
#[cfg_attr(docsrs, doc(cfg(feature = "wasmer")))]
pub use crate::wasmer_engine::{WasmerEngine, WasmerError};
