//! # Client
//!
//! The invoker. A call moves through fixed stages:
//!
//! 1. interface selection: if the uri is an interface, pick the implementation;
//! 2. uri resolution: walk the root resolver chain to a wrapper;
//! 3. environment assembly: configured env for the uri, the family overlay, the
//!    per-call override, then the wrapper's own `sanitizeEnv` if it has one;
//! 4. dispatch: run the method with a handle that charges sub-calls to this
//!    call's budget.
//!
//! A call carrying an override configuration runs stages 1 to 3 against a
//! throwaway client built from the merged configuration, with its own empty
//! cache. Dispatch, and therefore every sub-invocation, goes back to the base
//! client.
//!
//! Cancelling a call is dropping its future. Nothing is cached for a resolution
//! that did not complete, and nothing is left running.

mod config;
mod options;
mod resolution;

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use tracing::instrument;
use wrapcore::EnvMap;
use wrapcore::EnvRecord;
use wrapcore::InvokeError;
use wrapcore::Limits;
use wrapcore::MethodRef;
use wrapcore::ResolutionError;
use wrapcore::Uri;
use wrapcore::WrapManifest;
use wrapcore::codec;
use wrapcore::env::merge_into;

use crate::budget::CallBudget;
use crate::handle::InvokerHandle;
use crate::module;
use crate::module::ModuleRuntime;
use crate::resolver::CachingResolver;
use crate::resolver::DEFAULT_RESOLVER_INTERFACE;
use crate::resolver::ExtendableResolver;
use crate::resolver::RedirectResolver;
use crate::resolver::ResolutionCache;
use crate::resolver::Resolver;
use crate::resolver::ResolverAggregator;
use crate::resolver::StaticResolver;
use crate::wrapper::WrapCall;
use crate::wrapper::Wrapper;

pub use config::ClientConfig;
pub use config::ClientConfigBuilder;
pub use options::InvokeOptions;
pub use resolution::Resolution;
pub use resolution::ResolutionStep;
pub use resolution::StepOutcome;

/// Method a wrapper may declare to rewrite its environment before each call.
pub const SANITIZE_ENV: &str = "sanitizeEnv";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Runtime(#[from] module::Error),
}

pub(crate) fn decode_result<T: DeserializeOwned>(uri: &Uri, method: &str, bytes: &[u8]) -> Result<T, InvokeError> {
    codec::decode(bytes).map_err(|e| InvokeError::InvalidResult {
        uri: uri.clone(),
        method: method.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let runtime = match &config.runtime {
            Some(runtime) => runtime.clone(),
            None => ModuleRuntime::new()?,
        };
        Ok(Self {
            inner: Arc::new(ClientInner::new(config, runtime, None)),
        })
    }

    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn module_runtime(&self) -> &ModuleRuntime {
        &self.inner.runtime
    }

    /// A handle carrying a fresh budget, as a top-level call would get.
    pub fn handle(&self) -> InvokerHandle {
        InvokerHandle::new(self.inner.clone(), CallBudget::root(self.inner.limits.clone()))
    }

    pub async fn invoke_raw(&self, options: InvokeOptions) -> Result<Vec<u8>, InvokeError> {
        let limits = match options.config.as_ref().and_then(|c| c.limits.clone()) {
            Some(limits) => Arc::new(limits),
            None => self.inner.limits.clone(),
        };
        ClientInner::invoke_boxed(self.inner.clone(), options, CallBudget::root(limits)).await
    }

    /// Invokes with encoded `args` and decodes the result into `T`.
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        uri: &Uri,
        method: &str,
        args: &(impl Serialize + ?Sized + Sync),
    ) -> Result<T, InvokeError> {
        let options = InvokeOptions::new(uri.clone(), method).encoded_args(args)?;
        self.invoke_with(options).await
    }

    pub async fn invoke_with<T: DeserializeOwned>(&self, options: InvokeOptions) -> Result<T, InvokeError> {
        let uri = options.uri.clone();
        let method = options.method.clone();
        let bytes = self.invoke_raw(options).await?;
        decode_result(&uri, &method, &bytes)
    }

    /// Resolves `uri` without invoking anything on the result.
    pub async fn try_resolve_uri(&self, uri: &Uri) -> Result<Resolution, ResolutionError> {
        let handle = self.handle();
        resolution::resolve(&self.inner.root, uri, &handle, self.inner.limits.max_redirects).await
    }

    pub async fn load_wrapper(&self, uri: &Uri) -> Result<Arc<Wrapper>, InvokeError> {
        let handle = self.handle();
        let (wrapper, _) = self.inner.load(uri, &handle).await?;
        Ok(wrapper)
    }

    pub async fn get_manifest(&self, uri: &Uri) -> Result<WrapManifest, InvokeError> {
        Ok(self.load_wrapper(uri).await?.manifest().clone())
    }

    /// Bound implementations of `interface`, plus every registration whose
    /// manifest declares it implements `interface`.
    pub fn get_implementations(&self, interface: &Uri, apply_redirects: bool) -> Vec<Uri> {
        self.inner.get_implementations(interface, apply_redirects)
    }

    /// The merged environment record configured for `uri`.
    pub fn get_env(&self, uri: &Uri) -> Option<&EnvRecord> {
        self.inner.envs.get(uri)
    }

    /// Drops every cached wrapper and the compiled modules held by the runtime.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        self.inner.runtime.clear();
    }

    /// Drops the wrapper cached for `uri`, releasing its compiled module.
    pub fn invalidate(&self, uri: &Uri) -> bool {
        match self.inner.cache.invalidate(uri) {
            Some(wrapper) => {
                if let Wrapper::Module(module) = wrapper.as_ref() {
                    module.release();
                }
                true
            }
            None => false,
        }
    }

    pub fn cached_len(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn is_cached(&self, uri: &Uri) -> bool {
        self.inner.cache.contains(uri)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("registrations", &self.inner.config.statics.len())
            .field("cached", &self.inner.cache.len())
            .finish()
    }
}

pub(crate) struct ClientInner {
    config: ClientConfig,
    limits: Arc<Limits>,
    runtime: ModuleRuntime,
    envs: HashMap<Uri, EnvRecord>,
    redirects: RedirectResolver,
    root: Resolver,
    cache: Arc<ResolutionCache>,
    /// The client dispatch goes through; `None` for a base client.
    base: Option<Arc<ClientInner>>,
}

impl ClientInner {
    fn new(config: ClientConfig, runtime: ModuleRuntime, base: Option<Arc<ClientInner>>) -> Self {
        let statics = StaticResolver::new(config.statics.iter().cloned());
        let redirects = RedirectResolver::new(&config.redirects);

        let mut envs: HashMap<Uri, EnvRecord> = HashMap::new();
        for record in &config.envs {
            let merged = match envs.get(&record.uri) {
                Some(existing) => existing.merged_with(record),
                None => record.clone(),
            };
            envs.insert(record.uri.clone(), merged);
        }

        let mut chain = vec![Resolver::from(redirects.clone()), Resolver::from(statics)];
        chain.extend(config.resolvers.iter().cloned());
        let interface = config
            .resolver_interface
            .clone()
            .or_else(|| Uri::parse(DEFAULT_RESOLVER_INTERFACE).ok());
        if let Some(interface) = interface {
            chain.push(ExtendableResolver::new(interface).into());
        }

        let cache = Arc::new(ResolutionCache::new());
        let root = CachingResolver::new(ResolverAggregator::new(chain).into(), cache.clone()).into();

        Self {
            limits: Arc::new(config.limits()),
            config,
            runtime,
            envs,
            redirects,
            root,
            cache,
            base,
        }
    }

    pub(crate) fn module_runtime(&self) -> &ModuleRuntime {
        &self.runtime
    }

    /// A call-scoped client for an override configuration.
    fn scoped(self: &Arc<Self>, over: &ClientConfig) -> Self {
        let base = self.base.clone().unwrap_or_else(|| self.clone());
        let runtime = over.runtime.clone().unwrap_or_else(|| self.runtime.clone());
        ClientInner::new(self.config.merged_with(over), runtime, Some(base))
    }

    fn dispatcher(self: &Arc<Self>) -> Arc<Self> {
        self.base.clone().unwrap_or_else(|| self.clone())
    }

    pub(crate) fn invoke_boxed(
        client: Arc<Self>,
        options: InvokeOptions,
        budget: CallBudget,
    ) -> BoxFuture<'static, Result<Vec<u8>, InvokeError>> {
        async move { client.invoke(options, budget).await }.boxed()
    }

    #[instrument(skip_all, fields(uri = %options.uri, method = %options.method, depth = budget.depth() + 1))]
    async fn invoke(self: Arc<Self>, mut options: InvokeOptions, budget: CallBudget) -> Result<Vec<u8>, InvokeError> {
        if let Some(over) = options.config.take() {
            let scoped = Arc::new(self.scoped(&over));
            return ClientInner::invoke_boxed(scoped, options, budget).await;
        }

        let budget = budget.enter(&options.uri)?;
        let target = self.select_implementation(&options.uri, options.implementation.as_ref())?;
        if target != options.uri {
            debug!(interface = %options.uri, implementation = %target, "implementation selected");
        }

        let resolving = InvokerHandle::new(self.clone(), budget.clone());
        let (wrapper, final_uri) = self.load(&target, &resolving).await?;

        let method = wrapper.manifest().method_ref(&options.method);
        let dispatch = InvokerHandle::new(self.dispatcher(), budget);

        let env = self.assemble_env(&target, &final_uri, &method, options.env.as_ref());
        let env = self.sanitize_env(&wrapper, &target, &method, env, &dispatch).await?;
        if env.is_none() && wrapper.manifest().env_required(&method) {
            return Err(InvokeError::MissingEnv {
                uri: target,
                method: options.method,
                family: method.family,
            });
        }

        let call = WrapCall {
            uri: target.clone(),
            method,
            args: options.args,
            env,
        };
        wrapper
            .invoke(call, dispatch)
            .await
            .map_err(|e| InvokeError::from_wrap(&target, &options.method, e))
    }

    fn select_implementation(&self, uri: &Uri, pinned: Option<&Uri>) -> Result<Uri, InvokeError> {
        let implementations = self.get_implementations(uri, false);

        if let Some(pinned) = pinned {
            return if implementations.contains(pinned) {
                Ok(pinned.clone())
            } else {
                Err(InvokeError::ImplementationNotBound {
                    interface: uri.clone(),
                    implementation: pinned.clone(),
                })
            };
        }

        match implementations.as_slice() {
            [] => Ok(uri.clone()),
            [only] => Ok(only.clone()),
            _ => Err(InvokeError::AmbiguousImplementation {
                interface: uri.clone(),
                implementations,
            }),
        }
    }

    async fn load(&self, uri: &Uri, handle: &InvokerHandle) -> Result<(Arc<Wrapper>, Uri), InvokeError> {
        let max_redirects = handle.budget().limits().max_redirects;
        let resolution = resolution::resolve(&self.root, uri, handle, max_redirects)
            .await
            .map_err(|source| InvokeError::ResolutionFailed {
                uri: uri.clone(),
                source,
            })?;

        Ok((resolution.wrapper, resolution.final_uri))
    }

    /// Env for a call: the record of the effective uri (else the final uri),
    /// flattened for the method family, with `over` on top.
    fn assemble_env(&self, effective: &Uri, final_uri: &Uri, method: &MethodRef, over: Option<&EnvMap>) -> Option<EnvMap> {
        let record = self.envs.get(effective).or_else(|| self.envs.get(final_uri));
        let mut env = record.map(|r| r.for_family(&method.family));
        if let Some(over) = over {
            merge_into(env.get_or_insert_with(EnvMap::new), over);
        }
        env.filter(|env| !env.is_empty())
    }

    async fn sanitize_env(
        &self,
        wrapper: &Wrapper,
        target: &Uri,
        method: &MethodRef,
        env: Option<EnvMap>,
        handle: &InvokerHandle,
    ) -> Result<Option<EnvMap>, InvokeError> {
        let Some(env) = env else {
            return Ok(None);
        };

        let sanitizer = MethodRef::new(method.family.clone(), SANITIZE_ENV);
        if method.name == SANITIZE_ENV || wrapper.manifest().method(&sanitizer).is_none() {
            return Ok(Some(env));
        }

        let sanitizer_name = sanitizer.to_string();
        let args = codec::encode(&json!({ "env": env })).map_err(|e| InvokeError::MalformedArguments {
            uri: target.clone(),
            method: sanitizer_name.clone(),
            reason: e.to_string(),
        })?;
        let call = WrapCall {
            uri: target.clone(),
            method: sanitizer,
            args,
            env: None,
        };
        let bytes = wrapper
            .invoke(call, handle.clone())
            .await
            .map_err(|e| InvokeError::from_wrap(target, &sanitizer_name, e))?;
        let sanitized: Option<EnvMap> = decode_result(target, &sanitizer_name, &bytes)?;
        Ok(sanitized.filter(|env| !env.is_empty()))
    }

    pub(crate) fn get_implementations(&self, interface: &Uri, apply_redirects: bool) -> Vec<Uri> {
        let bound = self
            .config
            .interfaces
            .iter()
            .filter(|binding| &binding.interface == interface)
            .flat_map(|binding| binding.implementations.iter().cloned());
        let declared = self
            .config
            .statics
            .iter()
            .filter(|(_, entry)| entry.manifest().implements.contains(interface))
            .map(|(uri, _)| uri.clone());

        let mut found: Vec<Uri> = Vec::new();
        for uri in bound.chain(declared) {
            let uri = if apply_redirects { self.follow_redirects(uri) } else { uri };
            if !found.contains(&uri) {
                found.push(uri);
            }
        }
        found
    }

    /// Applies the redirect table to `uri`, stopping at a cycle or the hop bound.
    fn follow_redirects(&self, uri: Uri) -> Uri {
        let mut current = uri;
        let mut seen = Vec::new();
        for _ in 0..self.limits.max_redirects {
            match self.redirects.target(&current) {
                Some(next) if next != &current && !seen.contains(next) => {
                    let next = next.clone();
                    seen.push(std::mem::replace(&mut current, next));
                }
                _ => break,
            }
        }
        current
    }
}
