//! # Binary-module wrappers
//!
//! A module package is a core WebAssembly module plus its manifest. Creating a
//! wrapper compiles the module (through the runtime's compile registry) and
//! pre-links the `wrap` host-call table. Every invocation then instantiates into
//! a fresh store, calls `_wrap_invoke` and tears the instance down.

mod context;
mod host;
mod runtime;

use std::sync::Arc;

use tracing::debug;
use tracing::instrument;
use wasmtime::ExternType;
use wasmtime::InstancePre;
use wasmtime::Linker;
use wasmtime::Module;
use wasmtime::Store;
use wrapcore::WrapError;
use wrapcore::WrapManifest;
use wrapcore::codec;

use crate::handle::InvokerHandle;
use crate::wrapper::WrapCall;

pub use context::Abort;
pub use context::ModuleCtx;
pub use host::NAMESPACE;
pub use runtime::Error;
pub use runtime::ModuleRuntime;
pub use runtime::Result;

/// Name of the guest entry point.
pub const ENTRY_POINT: &str = "_wrap_invoke";

#[derive(Clone)]
pub struct ModulePackage {
    runtime: ModuleRuntime,
    bytes: Arc<[u8]>,
    manifest: Arc<WrapManifest>,
}

impl ModulePackage {
    pub fn new(runtime: ModuleRuntime, bytes: impl Into<Arc<[u8]>>, manifest: WrapManifest) -> Self {
        Self {
            runtime,
            bytes: bytes.into(),
            manifest: Arc::new(manifest),
        }
    }

    /// Builds a package from raw module bytes and a JSON manifest.
    pub fn from_parts(
        runtime: ModuleRuntime,
        bytes: impl Into<Arc<[u8]>>,
        manifest: &[u8],
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(Self::new(runtime, bytes, WrapManifest::from_bytes(manifest)?))
    }

    pub fn manifest(&self) -> &WrapManifest {
        &self.manifest
    }

    /// Compiles and links the module. Compilation runs on the blocking pool.
    pub async fn create_wrapper(&self) -> std::result::Result<ModuleWrapper, WrapError> {
        let runtime = self.runtime.clone();
        let bytes = self.bytes.clone();
        let module = tokio::task::spawn_blocking(move || runtime.compile(&bytes))
            .await
            .map_err(|e| WrapError::Instantiate(e.to_string()))?
            .map_err(|e| WrapError::Instantiate(e.to_string()))?;
        check_exports(&module)?;

        let mut linker = Linker::new(self.runtime.engine());
        host::link(&mut linker).map_err(|e| WrapError::Instantiate(format!("{e:#}")))?;
        let pre = linker
            .instantiate_pre(&module)
            .map_err(|e| WrapError::Instantiate(format!("{e:#}")))?;

        debug!(module = %self.manifest.name, "module wrapper created");
        Ok(ModuleWrapper {
            manifest: self.manifest.clone(),
            runtime: self.runtime.clone(),
            pre,
        })
    }
}

/// A module must export its memory and the entry point.
fn check_exports(module: &Module) -> std::result::Result<(), WrapError> {
    match module.get_export(ENTRY_POINT) {
        Some(ExternType::Func(_)) => (),
        _ => return Err(WrapError::Instantiate(format!("module does not export `{ENTRY_POINT}`"))),
    }
    match module.get_export("memory") {
        Some(ExternType::Memory(_)) => Ok(()),
        _ => Err(WrapError::Instantiate("module does not export `memory`".into())),
    }
}

pub struct ModuleWrapper {
    manifest: Arc<WrapManifest>,
    runtime: ModuleRuntime,
    pre: InstancePre<ModuleCtx>,
}

impl ModuleWrapper {
    pub fn manifest(&self) -> &WrapManifest {
        &self.manifest
    }

    /// Drops this wrapper's module from the runtime's compile registry.
    pub(crate) fn release(&self) {
        self.runtime.forget(self.pre.module());
    }

    #[instrument(skip_all, fields(module = %self.manifest.name, method = %call.method))]
    pub async fn invoke(&self, call: WrapCall, handle: InvokerHandle) -> std::result::Result<Vec<u8>, WrapError> {
        let limits = handle.budget().limits().clone();
        let env = match &call.env {
            Some(env) => codec::encode(env).map_err(|e| WrapError::aborted(e.to_string()))?,
            None => Vec::new(),
        };

        let ctx = ModuleCtx::new(call.method.to_string(), call.args, env, handle, limits.memory_bytes);
        let mut store = Store::new(self.pre.module().engine(), ctx);
        store.limiter(|ctx| &mut ctx.limits);
        store
            .set_fuel(limits.fuel.unwrap_or(u64::MAX))
            .map_err(|e| WrapError::Instantiate(format!("{e:#}")))?;

        let instance = self
            .pre
            .instantiate_async(&mut store)
            .await
            .map_err(|e| WrapError::aborted(format!("instantiation failed: {e:#}")))?;
        let entry = instance
            .get_typed_func::<(u32, u32, u32), u32>(&mut store, ENTRY_POINT)
            .map_err(|e| WrapError::Instantiate(format!("{e:#}")))?;

        let lengths = store.data().entry_args();
        let outcome = entry.call_async(&mut store, lengths).await;
        store.into_data().finish(outcome)
    }
}
