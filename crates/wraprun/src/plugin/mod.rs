//! # Native plugins
//!
//! A plugin is a wrapper whose methods are Rust closures or `PluginMethod`
//! implementations. The package holds a manifest and a factory; every
//! `create_wrapper` call asks the factory for a fresh method table.
//!
//! Methods receive decoded arguments and a `PluginContext`. The environment of
//! the running call is also reachable through `current_env()`, which reads a
//! task-local slot scoped to exactly one invocation.

mod table;

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use wrapcore::EnvMap;
use wrapcore::InvokeError;
use wrapcore::MethodRef;
use wrapcore::Uri;
use wrapcore::WrapError;
use wrapcore::WrapManifest;
use wrapcore::codec;

use crate::handle::InvokerHandle;
use crate::wrapper::WrapCall;

pub use table::MethodTable;
pub use table::PluginMethod;
pub use table::parse_args;

tokio::task_local! {
    static CURRENT_ENV: Option<Arc<EnvMap>>;
}

/// Environment of the plugin call running on this task, if any.
///
/// Outside a plugin call, or in tasks spawned by one, this returns `None`.
pub fn current_env() -> Option<Arc<EnvMap>> {
    CURRENT_ENV.try_with(|env| env.clone()).ok().flatten()
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("{0}")]
    Message(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("sub-invocation failed: {0}")]
    Invoke(#[from] InvokeError),
}

impl PluginError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    fn into_wrap(self, method: &MethodRef) -> WrapError {
        match self {
            Self::Message(message) => WrapError::aborted(message),
            Self::InvalidArgs(reason) => WrapError::MalformedArguments {
                method: method.to_string(),
                reason,
            },
            Self::Invoke(inner) => WrapError::ExecutionAborted {
                message: format!("sub-invocation failed: {inner}"),
                source: Some(Box::new(inner)),
            },
        }
    }
}

/// What a plugin method sees of the call it is serving.
#[derive(Clone, Debug)]
pub struct PluginContext {
    uri: Uri,
    method: MethodRef,
    env: Option<Arc<EnvMap>>,
    invoker: InvokerHandle,
}

impl PluginContext {
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn method(&self) -> &MethodRef {
        &self.method
    }

    pub fn env(&self) -> Option<&EnvMap> {
        self.env.as_deref()
    }

    /// Handle for sub-invocations, charged to this call's budget.
    pub fn invoker(&self) -> &InvokerHandle {
        &self.invoker
    }
}

#[derive(Clone)]
pub struct PluginPackage {
    manifest: Arc<WrapManifest>,
    factory: Arc<dyn Fn() -> MethodTable + Send + Sync>,
}

impl PluginPackage {
    pub fn new(manifest: WrapManifest, factory: impl Fn() -> MethodTable + Send + Sync + 'static) -> Self {
        Self {
            manifest: Arc::new(manifest),
            factory: Arc::new(factory),
        }
    }

    /// A package whose wrappers all share one table.
    pub fn from_table(manifest: WrapManifest, table: MethodTable) -> Self {
        Self::new(manifest, move || table.clone())
    }

    pub fn manifest(&self) -> &WrapManifest {
        &self.manifest
    }

    pub fn create_wrapper(&self) -> PluginWrapper {
        PluginWrapper {
            manifest: self.manifest.clone(),
            table: (self.factory)(),
        }
    }
}

pub struct PluginWrapper {
    manifest: Arc<WrapManifest>,
    table: MethodTable,
}

impl PluginWrapper {
    pub fn manifest(&self) -> &WrapManifest {
        &self.manifest
    }

    pub async fn invoke(&self, call: WrapCall, handle: InvokerHandle) -> Result<Vec<u8>, WrapError> {
        let Some(body) = self.table.get(&call.method) else {
            return Err(WrapError::MethodNotFound {
                method: call.method.to_string(),
            });
        };

        let args: Value = codec::decode(&call.args).map_err(|e| WrapError::MalformedArguments {
            method: call.method.to_string(),
            reason: e.to_string(),
        })?;

        debug!(plugin = %self.manifest.name, method = %call.method, "plugin call");

        let env = call.env.map(Arc::new);
        let ctx = PluginContext {
            uri: call.uri,
            method: call.method.clone(),
            env: env.clone(),
            invoker: handle,
        };

        let output = CURRENT_ENV
            .scope(env, body.call(args, ctx))
            .await
            .map_err(|e| e.into_wrap(&call.method))?;

        codec::encode(&output).map_err(|e| WrapError::aborted(e.to_string()))
    }
}
