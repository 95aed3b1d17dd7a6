//! # Packages and wrappers
//!
//! A package is a loadable artifact: a manifest plus whatever is needed to build
//! a wrapper from it. A wrapper is the live, invocable form. Both come in the two
//! variants the engine knows about, binary modules and native plugins, and both
//! expose the same contract regardless of variant.

use std::sync::Arc;

use serde_json::Value;
use wrapcore::EnvMap;
use wrapcore::MethodRef;
use wrapcore::Uri;
use wrapcore::WrapError;
use wrapcore::WrapManifest;
use wrapcore::codec;

use crate::handle::InvokerHandle;
use crate::module::ModulePackage;
use crate::module::ModuleWrapper;
use crate::plugin::PluginPackage;
use crate::plugin::PluginWrapper;

/// One call as a wrapper sees it, after interface selection and env assembly.
#[derive(Clone, Debug)]
pub struct WrapCall {
    /// The uri the caller targeted (the implementation, when called through an interface).
    pub uri: Uri,
    pub method: MethodRef,
    pub args: Vec<u8>,
    pub env: Option<EnvMap>,
}

#[derive(Clone)]
pub enum WrapPackage {
    Module(ModulePackage),
    Plugin(PluginPackage),
}

impl WrapPackage {
    pub fn manifest(&self) -> &WrapManifest {
        match self {
            Self::Module(package) => package.manifest(),
            Self::Plugin(package) => package.manifest(),
        }
    }

    pub async fn create_wrapper(&self) -> Result<Wrapper, WrapError> {
        match self {
            Self::Module(package) => Ok(Wrapper::Module(package.create_wrapper().await?)),
            Self::Plugin(package) => Ok(Wrapper::Plugin(package.create_wrapper())),
        }
    }
}

impl From<ModulePackage> for WrapPackage {
    fn from(package: ModulePackage) -> Self {
        Self::Module(package)
    }
}

impl From<PluginPackage> for WrapPackage {
    fn from(package: PluginPackage) -> Self {
        Self::Plugin(package)
    }
}

impl std::fmt::Debug for WrapPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Self::Module(_) => "Module",
            Self::Plugin(_) => "Plugin",
        };
        f.debug_tuple(variant).field(&self.manifest().name).finish()
    }
}

pub enum Wrapper {
    Module(ModuleWrapper),
    Plugin(PluginWrapper),
}

impl Wrapper {
    pub fn manifest(&self) -> &WrapManifest {
        match self {
            Self::Module(wrapper) => wrapper.manifest(),
            Self::Plugin(wrapper) => wrapper.manifest(),
        }
    }

    /// Runs one method.
    ///
    /// Undeclared methods, arguments that do not match their declaration and a
    /// missing required environment are rejected before the variant sees the call.
    pub async fn invoke(&self, call: WrapCall, handle: InvokerHandle) -> Result<Vec<u8>, WrapError> {
        self.check(&call)?;

        match self {
            Self::Module(wrapper) => wrapper.invoke(call, handle).await,
            Self::Plugin(wrapper) => wrapper.invoke(call, handle).await,
        }
    }

    fn check(&self, call: &WrapCall) -> Result<(), WrapError> {
        let manifest = self.manifest();
        if manifest.rejects(&call.method) {
            return Err(WrapError::MethodNotFound {
                method: call.method.to_string(),
            });
        }

        let Some(decl) = manifest.method(&call.method) else {
            return Ok(());
        };

        let args: Value = codec::decode(&call.args).map_err(|e| WrapError::MalformedArguments {
            method: call.method.to_string(),
            reason: e.to_string(),
        })?;
        decl.validate_args(&args).map_err(|reason| WrapError::MalformedArguments {
            method: call.method.to_string(),
            reason,
        })?;

        if decl.env_required && call.env.is_none() {
            return Err(WrapError::MissingEnv {
                method: call.method.to_string(),
                family: call.method.family.clone(),
            });
        }
        Ok(())
    }
}

impl From<ModuleWrapper> for Wrapper {
    fn from(wrapper: ModuleWrapper) -> Self {
        Self::Module(wrapper)
    }
}

impl From<PluginWrapper> for Wrapper {
    fn from(wrapper: PluginWrapper) -> Self {
        Self::Plugin(wrapper)
    }
}

impl std::fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Self::Module(_) => "Module",
            Self::Plugin(_) => "Plugin",
        };
        f.debug_tuple(variant).field(&self.manifest().name).finish()
    }
}

/// Either form a static registration can hold.
#[derive(Clone, Debug)]
pub enum StaticEntry {
    Package(WrapPackage),
    Wrapper(Arc<Wrapper>),
}

impl StaticEntry {
    pub fn manifest(&self) -> &WrapManifest {
        match self {
            Self::Package(package) => package.manifest(),
            Self::Wrapper(wrapper) => wrapper.manifest(),
        }
    }
}
