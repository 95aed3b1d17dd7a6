//! # Error taxonomy
//!
//! Resolvers fail with `ResolutionError`, wrappers with `WrapError`. The invoker
//! folds both into one `InvokeError` per call, tagged with the pipeline stage it
//! came from. Nested sub-invocation failures stay attached as `source`, so the
//! whole causal chain survives up to the top-level caller.

use std::fmt;

use crate::manifest::MethodFamily;
use crate::uri::Uri;

fn render_chain(chain: &[Uri]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolutionError {
    #[error("no resolver knows '{0}'")]
    NotFound(Uri),
    #[error("redirect loop while resolving: {}", render_chain(.chain))]
    InfiniteRedirect { chain: Vec<Uri> },
    #[error("backend failure while resolving '{uri}': {reason}")]
    BackendFailure { uri: Uri, reason: String },
    #[error("package for '{uri}' could not be loaded: {reason}")]
    InvalidPackage { uri: Uri, reason: String },
}

/// Failures raised by a wrapper while handling one call.
#[derive(Debug, thiserror::Error)]
pub enum WrapError {
    #[error("method '{method}' not found")]
    MethodNotFound { method: String },
    #[error("malformed arguments for '{method}': {reason}")]
    MalformedArguments { method: String, reason: String },
    #[error("execution aborted: {message}")]
    ExecutionAborted {
        message: String,
        /// Sub-invocation failure that led to the abort, if any.
        #[source]
        source: Option<Box<InvokeError>>,
    },
    #[error("method '{method}' requires a {family} environment and none is set")]
    MissingEnv { method: String, family: MethodFamily },
    #[error("wrapper could not be instantiated: {0}")]
    Instantiate(String),
}

impl WrapError {
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::ExecutionAborted {
            message: message.into(),
            source: None,
        }
    }
}

/// Pipeline stage an `InvokeError` originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeStage {
    InterfaceResolution,
    UriResolution,
    EnvAssembly,
    Dispatch,
    ResultDecode,
}

impl fmt::Display for InvokeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InterfaceResolution => "interface resolution",
            Self::UriResolution => "uri resolution",
            Self::EnvAssembly => "environment assembly",
            Self::Dispatch => "dispatch",
            Self::ResultDecode => "result decode",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("interface '{interface}' has {} implementations, pick one", .implementations.len())]
    AmbiguousImplementation { interface: Uri, implementations: Vec<Uri> },
    #[error("'{implementation}' is not bound to interface '{interface}'")]
    ImplementationNotBound { interface: Uri, implementation: Uri },
    #[error("resolution of '{uri}' failed")]
    ResolutionFailed {
        uri: Uri,
        #[source]
        source: ResolutionError,
    },
    #[error("loading wrapper '{uri}' failed: {reason}")]
    Load { uri: Uri, reason: String },
    #[error("'{uri}' method '{method}' requires a {family} environment and none is set")]
    MissingEnv { uri: Uri, method: String, family: MethodFamily },
    #[error("'{uri}' has no method '{method}'")]
    MethodNotFound { uri: Uri, method: String },
    #[error("malformed arguments for '{uri}' method '{method}': {reason}")]
    MalformedArguments { uri: Uri, method: String, reason: String },
    #[error("'{uri}' method '{method}' aborted: {message}")]
    ExecutionAborted {
        uri: Uri,
        method: String,
        message: String,
        #[source]
        source: Option<Box<InvokeError>>,
    },
    #[error("call depth {limit} exceeded invoking '{uri}'")]
    RecursionLimitExceeded { uri: Uri, limit: usize },
    #[error("call tree exceeded {limit} invocations at '{uri}'")]
    InvocationLimitExceeded { uri: Uri, limit: usize },
    #[error("result of '{uri}' method '{method}' could not be decoded: {reason}")]
    InvalidResult { uri: Uri, method: String, reason: String },
}

impl InvokeError {
    /// Attaches call coordinates to a wrapper failure.
    pub fn from_wrap(uri: &Uri, method: &str, error: WrapError) -> Self {
        let uri = uri.clone();
        match error {
            WrapError::MethodNotFound { method } => Self::MethodNotFound { uri, method },
            WrapError::MalformedArguments { method, reason } => {
                Self::MalformedArguments { uri, method, reason }
            }
            WrapError::ExecutionAborted { message, source } => Self::ExecutionAborted {
                uri,
                method: method.to_string(),
                message,
                source,
            },
            WrapError::MissingEnv { method, family } => Self::MissingEnv { uri, method, family },
            WrapError::Instantiate(reason) => Self::Load { uri, reason },
        }
    }

    pub fn stage(&self) -> InvokeStage {
        match self {
            // Budget checks run on entry, before interface selection completes.
            Self::AmbiguousImplementation { .. }
            | Self::ImplementationNotBound { .. }
            | Self::RecursionLimitExceeded { .. }
            | Self::InvocationLimitExceeded { .. } => InvokeStage::InterfaceResolution,
            Self::ResolutionFailed { .. } | Self::Load { .. } => InvokeStage::UriResolution,
            Self::MissingEnv { .. } => InvokeStage::EnvAssembly,
            Self::MethodNotFound { .. }
            | Self::MalformedArguments { .. }
            | Self::ExecutionAborted { .. } => InvokeStage::Dispatch,
            Self::InvalidResult { .. } => InvokeStage::ResultDecode,
        }
    }

    /// The innermost invocation failure in the sub-invocation chain.
    pub fn root_cause(&self) -> &InvokeError {
        let mut current = self;
        while let Self::ExecutionAborted { source: Some(inner), .. } = current {
            current = inner;
        }
        current
    }

    pub fn resolution_error(&self) -> Option<&ResolutionError> {
        match self {
            Self::ResolutionFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        Uri::parse(s).unwrap()
    }

    #[test]
    fn test_from_wrap_keeps_coordinates() {
        let err = InvokeError::from_wrap(
            &uri("wrap://ens/a.eth"),
            "query.x",
            WrapError::MethodNotFound { method: "query.x".into() },
        );
        assert!(matches!(&err, InvokeError::MethodNotFound { method, .. } if method == "query.x"));
        assert_eq!(err.stage(), InvokeStage::Dispatch);
    }

    #[test]
    fn test_root_cause_walks_chain() {
        let inner = InvokeError::RecursionLimitExceeded { uri: uri("wrap://a/b"), limit: 4 };
        let middle = InvokeError::ExecutionAborted {
            uri: uri("wrap://a/b"),
            method: "query.loop".into(),
            message: "sub-invocation failed".into(),
            source: Some(Box::new(inner)),
        };
        let outer = InvokeError::ExecutionAborted {
            uri: uri("wrap://a/c"),
            method: "query.loop".into(),
            message: "sub-invocation failed".into(),
            source: Some(Box::new(middle)),
        };
        assert!(matches!(outer.root_cause(), InvokeError::RecursionLimitExceeded { limit: 4, .. }));
        assert!(std::error::Error::source(&outer).is_some());
    }

    #[test]
    fn test_redirect_loop_names_cycle() {
        let err = ResolutionError::InfiniteRedirect {
            chain: vec![uri("wrap://x/a"), uri("wrap://x/b"), uri("wrap://x/a")],
        };
        assert_eq!(
            err.to_string(),
            "redirect loop while resolving: wrap://x/a -> wrap://x/b -> wrap://x/a"
        );
    }
}
