#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use tempfile::TempDir;
use wasmer_file_cache::{
    Bundle, CacheConfig, CompiledCallback, ModuleLoader, StreamingCallback, StreamingEngine,
    StreamingSink,
};

/// What the fake engine prepends to a module's bytes when "compiling" it.
pub const COMPILED_PREFIX: &[u8] = b"compiled:";

pub const WASM: &[u8] = b"\0asm\x01\0\0\0 pretend this is code";

pub fn compiled_form(wasm: &[u8]) -> Vec<u8> {
    [COMPILED_PREFIX, wasm].concat()
}

/// Everything the engine saw while a sink was being driven.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    OfferedCache { accepted: bool },
    Identity(String),
    Received(usize),
    Finished { with_callback: bool },
}

#[derive(Debug, Clone)]
pub struct FakeModule {
    pub compiled: Bytes,
    pub from_cache: bool,
    pub identity: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("Not a WebAssembly module")]
pub struct InvalidModule;

/// A [`StreamingEngine`] which "compiles" by prefixing the source bytes and
/// records how it was driven.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    /// Hand the compiled bytes over from a background thread, the way a
    /// tiered compiler would.
    tiered: bool,
    sessions: Arc<Mutex<Vec<Vec<Event>>>>,
}

impl FakeEngine {
    pub fn tiered() -> Self {
        FakeEngine {
            tiered: true,
            ..Default::default()
        }
    }

    /// The events from each compilation, oldest first.
    pub fn sessions(&self) -> Vec<Vec<Event>> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn last_session(&self) -> Vec<Event> {
        self.sessions().pop().unwrap_or_default()
    }
}

#[derive(Default)]
struct FakeSink {
    cached: Option<Bytes>,
    identity: Option<String>,
    wasm: Vec<u8>,
    on_compiled: Option<CompiledCallback>,
    events: Vec<Event>,
}

impl StreamingSink for FakeSink {
    fn set_compiled_module_bytes(&mut self, bytes: Bytes) -> bool {
        let accepted = bytes.starts_with(COMPILED_PREFIX) && bytes.len() > COMPILED_PREFIX.len();
        if accepted {
            self.cached = Some(bytes);
        }
        self.events.push(Event::OfferedCache { accepted });
        accepted
    }

    fn set_identity(&mut self, identity: &str) {
        self.identity = Some(identity.to_string());
        self.events.push(Event::Identity(identity.to_string()));
    }

    fn on_bytes_received(&mut self, bytes: &[u8]) {
        self.wasm.extend_from_slice(bytes);
        self.events.push(Event::Received(bytes.len()));
    }

    fn finish(&mut self, on_compiled: Option<CompiledCallback>) {
        self.events.push(Event::Finished {
            with_callback: on_compiled.is_some(),
        });
        self.on_compiled = on_compiled;
    }
}

#[async_trait::async_trait]
impl StreamingEngine for FakeEngine {
    type Module = FakeModule;
    type Error = InvalidModule;

    async fn compile_streaming(
        &self,
        bundle: Bundle,
        callback: StreamingCallback,
    ) -> Result<FakeModule, InvalidModule> {
        let mut sink = FakeSink::default();
        callback(bundle, &mut sink);

        let FakeSink {
            cached,
            identity,
            wasm,
            on_compiled,
            events,
        } = sink;
        self.sessions.lock().unwrap().push(events);

        if !wasm.starts_with(b"\0asm") {
            return Err(InvalidModule);
        }

        if let Some(compiled) = cached {
            return Ok(FakeModule {
                compiled,
                from_cache: true,
                identity,
            });
        }

        let compiled = Bytes::from(compiled_form(&wasm));

        if let Some(on_compiled) = on_compiled {
            let artifact = compiled.clone();
            if self.tiered {
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(50));
                    on_compiled(artifact);
                });
            } else {
                on_compiled(artifact);
            }
        }

        Ok(FakeModule {
            compiled,
            from_cache: false,
            identity,
        })
    }
}

/// A source module in a temporary directory with its own cache root.
pub struct Fixture {
    pub temp: TempDir,
    pub source: PathBuf,
    pub config: CacheConfig,
    pub engine: FakeEngine,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture::with_engine(FakeEngine::default())
    }

    pub fn with_engine(engine: FakeEngine) -> Self {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.wasm");
        std::fs::write(&source, WASM).unwrap();
        // Make sure anything written to the cache is strictly newer, even on
        // filesystems with coarse timestamps.
        set_mtime(&source, filetime::FileTime::from_unix_time(1_000_000, 0));
        let config = CacheConfig::new(temp.path().join("cache"));

        Fixture {
            temp,
            source,
            config,
            engine,
        }
    }

    pub fn loader(&self) -> ModuleLoader<FakeEngine> {
        ModuleLoader::with_config(self.engine.clone(), self.config.clone())
    }

    pub fn canonical_source(&self) -> PathBuf {
        std::fs::canonicalize(&self.source).unwrap()
    }

    pub fn entry(&self) -> PathBuf {
        self.config.locate(&self.canonical_source())
    }

    pub fn cache_entries(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.config.cache_root()) {
            Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn set_mtime(path: &Path, mtime: filetime::FileTime) {
    filetime::set_file_mtime(path, mtime).unwrap();
}

pub fn mtime(path: &Path) -> std::time::SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}

/// Wait for a background write-back to land.
pub async fn wait_for(path: &Path) {
    wait_until(&format!("\"{}\" is written", path.display()), || path.exists()).await;
}

pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("Timed out waiting until {what}");
}
