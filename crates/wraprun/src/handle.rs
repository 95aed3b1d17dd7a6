//! # Invoker handle
//!
//! The capability a running wrapper holds for calling back into the client. It
//! carries the caller's budget, so every sub-invocation is charged against the
//! call tree it belongs to.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use wrapcore::InvokeError;
use wrapcore::Uri;

use crate::budget::CallBudget;
use crate::client::ClientInner;
use crate::client::InvokeOptions;
use crate::module::ModuleRuntime;

#[derive(Clone)]
pub struct InvokerHandle {
    client: Arc<ClientInner>,
    budget: CallBudget,
}

impl InvokerHandle {
    pub(crate) fn new(client: Arc<ClientInner>, budget: CallBudget) -> Self {
        Self { client, budget }
    }

    pub fn budget(&self) -> &CallBudget {
        &self.budget
    }

    /// Runs the full invocation pipeline for a sub-call.
    ///
    /// The returned future owns everything it needs, so host calls can hold it
    /// across a guest suspension.
    pub fn invoke_raw(&self, options: InvokeOptions) -> BoxFuture<'static, Result<Vec<u8>, InvokeError>> {
        let client = self.client.clone();
        let budget = self.budget.clone();
        async move { ClientInner::invoke_boxed(client, options, budget).await }.boxed()
    }

    /// Typed form of `invoke_raw`.
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        uri: &Uri,
        method: &str,
        args: &(impl Serialize + ?Sized + Sync),
    ) -> Result<T, InvokeError> {
        let options = InvokeOptions::new(uri.clone(), method).encoded_args(args)?;
        let bytes = self.invoke_raw(options).await?;
        crate::client::decode_result(uri, method, &bytes)
    }

    /// Implementations registered for `interface`, after redirects.
    pub fn get_implementations(&self, interface: &Uri) -> Vec<Uri> {
        self.client.get_implementations(interface, true)
    }

    pub fn module_runtime(&self) -> &ModuleRuntime {
        self.client.module_runtime()
    }

    /// A handle whose resolutions skip `delegate`.
    pub(crate) fn resolving_with(&self, delegate: &Uri) -> Self {
        Self {
            client: self.client.clone(),
            budget: self.budget.resolving_with(delegate),
        }
    }
}

impl std::fmt::Debug for InvokerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokerHandle")
            .field("depth", &self.budget.depth())
            .field("invocations", &self.budget.invocations())
            .finish()
    }
}
