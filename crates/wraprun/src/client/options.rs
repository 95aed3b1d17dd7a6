//! Per-call invocation options.

use std::sync::Arc;

use serde::Serialize;
use wrapcore::EnvMap;
use wrapcore::InvokeError;
use wrapcore::Uri;
use wrapcore::codec;

use crate::client::ClientConfig;

#[derive(Clone, Debug)]
pub struct InvokeOptions {
    pub uri: Uri,
    pub method: String,
    /// Encoded arguments; empty means no arguments.
    pub args: Vec<u8>,
    /// Merged on top of the configured environment, these keys winning.
    pub env: Option<EnvMap>,
    /// Implementation to use when `uri` is an interface.
    pub implementation: Option<Uri>,
    /// Configuration layered over the client's for this call only.
    pub config: Option<Arc<ClientConfig>>,
}

impl InvokeOptions {
    pub fn new(uri: Uri, method: impl Into<String>) -> Self {
        Self {
            uri,
            method: method.into(),
            args: Vec::new(),
            env: None,
            implementation: None,
            config: None,
        }
    }

    pub fn raw_args(mut self, args: Vec<u8>) -> Self {
        self.args = args;
        self
    }

    /// Encodes `args` with the wrapper codec.
    pub fn encoded_args<T: Serialize + ?Sized>(mut self, args: &T) -> Result<Self, InvokeError> {
        self.args = codec::encode(args).map_err(|e| InvokeError::MalformedArguments {
            uri: self.uri.clone(),
            method: self.method.clone(),
            reason: e.to_string(),
        })?;
        Ok(self)
    }

    pub fn env(mut self, env: EnvMap) -> Self {
        self.env = Some(env);
        self
    }

    pub fn implementation(mut self, implementation: Uri) -> Self {
        self.implementation = Some(implementation);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(Arc::new(config));
        self
    }
}
