//! Method tables for native plugins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use wrapcore::MethodFamily;
use wrapcore::MethodRef;

use crate::plugin::PluginContext;
use crate::plugin::PluginError;

/// One natively implemented method.
#[async_trait]
pub trait PluginMethod: Send + Sync + 'static {
    async fn call(&self, args: Value, ctx: PluginContext) -> Result<Value, PluginError>;
}

#[async_trait]
impl<F, Fut> PluginMethod for F
where
    F: Fn(Value, PluginContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, PluginError>> + Send + 'static,
{
    async fn call(&self, args: Value, ctx: PluginContext) -> Result<Value, PluginError> {
        (self)(args, ctx).await
    }
}

/// Deserializes plugin arguments, reporting failures as malformed arguments.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, PluginError> {
    serde_json::from_value(args).map_err(|e| PluginError::InvalidArgs(e.to_string()))
}

#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<MethodRef, Arc<dyn PluginMethod>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: MethodRef, body: impl PluginMethod) -> Self {
        self.methods.insert(method, Arc::new(body));
        self
    }

    pub fn query<F, Fut>(self, name: &str, body: F) -> Self
    where
        F: Fn(Value, PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, PluginError>> + Send + 'static,
    {
        self.method(MethodRef::new(MethodFamily::Query, name), body)
    }

    pub fn mutation<F, Fut>(self, name: &str, body: F) -> Self
    where
        F: Fn(Value, PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, PluginError>> + Send + 'static,
    {
        self.method(MethodRef::new(MethodFamily::Mutation, name), body)
    }

    pub fn get(&self, method: &MethodRef) -> Option<Arc<dyn PluginMethod>> {
        self.methods.get(method).cloned()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
