//! # Module runtime
//!
//! Owns the wasmtime `Engine` shared by every binary-module wrapper of a client
//! and a registry of compiled modules, so a package whose wrapper was evicted
//! from the resolution cache does not pay for compilation twice.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use dashmap::DashMap;
use wasmtime::Engine;
use wasmtime::Module;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("engine error: {0}")]
    Engine(wasmtime::Error),
    #[error("module did not compile: {0:#}")]
    Compile(wasmtime::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone)]
pub struct ModuleRuntime {
    engine: Engine,
    compiled: Arc<DashMap<u64, Vec<(Arc<[u8]>, Module)>>>,
}

impl ModuleRuntime {
    /// Creates a runtime with async host calls and fuel metering enabled.
    pub fn new() -> Result<Self> {
        let mut config = wasmtime::Config::new();
        config.async_support(true);
        config.consume_fuel(true);

        let engine = Engine::new(&config).map_err(Error::Engine)?;
        Ok(Self::with_engine(engine))
    }

    /// Wraps a caller-configured engine.
    ///
    /// The engine must have async support and fuel consumption enabled.
    pub fn with_engine(engine: Engine) -> Self {
        Self {
            engine,
            compiled: Arc::new(DashMap::new()),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compiles `bytes`, reusing an earlier compilation of identical bytes.
    pub fn compile(&self, bytes: &Arc<[u8]>) -> Result<Module> {
        let key = fingerprint(bytes);
        if let Some(bucket) = self.compiled.get(&key) {
            if let Some((_, module)) = bucket.iter().find(|(seen, _)| seen[..] == bytes[..]) {
                return Ok(module.clone());
            }
        }

        let module = Module::new(&self.engine, &bytes[..]).map_err(Error::Compile)?;
        let mut bucket = self.compiled.entry(key).or_default();
        if !bucket.iter().any(|(seen, _)| seen[..] == bytes[..]) {
            bucket.push((bytes.clone(), module.clone()));
        }
        Ok(module)
    }

    /// Removes `module` from the registry. Wrappers already holding it keep working.
    pub fn forget(&self, module: &Module) {
        self.compiled.retain(|_, bucket| {
            bucket.retain(|(_, seen)| !Module::same(seen, module));
            !bucket.is_empty()
        });
    }

    pub fn clear(&self) {
        self.compiled.clear();
    }

    /// Number of distinct compiled modules held.
    pub fn compiled_len(&self) -> usize {
        self.compiled.iter().map(|bucket| bucket.len()).sum()
    }
}

impl std::fmt::Debug for ModuleRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRuntime")
            .field("compiled", &self.compiled_len())
            .finish()
    }
}

fn fingerprint(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}
