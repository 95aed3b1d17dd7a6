//! # Resolver extensions
//!
//! Resolution delegated to wrappers. Every implementation bound to the resolver
//! interface is asked, in binding order, through ordinary sub-invocations:
//!
//! - `query.tryResolveUri({ authority, path })` answers `null` (not mine), a
//!   redirect `{ uri }`, or a package `{ manifest }` (manifest bytes);
//! - for a package answer, `query.getFile({ path: "<path>/wrap.wasm" })` on the
//!   same delegate returns the module bytes.
//!
//! A delegate never resolves through itself: while it is answering, the budget
//! marks it busy and nested resolutions skip it.

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;
use wrapcore::InvokeError;
use wrapcore::ResolutionError;
use wrapcore::Uri;

use crate::handle::InvokerHandle;
use crate::module::ModulePackage;
use crate::resolver::ResolutionResult;
use crate::wrapper::WrapPackage;

pub const DEFAULT_RESOLVER_INTERFACE: &str = "wrap://core/uri-resolver";

const TRY_RESOLVE_URI: &str = "query.tryResolveUri";
const GET_FILE: &str = "query.getFile";
const MODULE_FILE: &str = "wrap.wasm";

#[derive(Serialize)]
struct TryResolveArgs<'a> {
    authority: &'a str,
    path: &'a str,
}

#[derive(Serialize)]
struct GetFileArgs {
    path: String,
}

/// A delegate's answer to `tryResolveUri`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaybeUriOrManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a single delegate could not answer.
#[derive(Debug, thiserror::Error)]
enum DelegateError {
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error("{0}")]
    Answer(String),
    #[error("{0}")]
    InvalidPackage(String),
}

#[derive(Clone, Debug)]
pub struct ExtendableResolver {
    interface: Uri,
}

impl ExtendableResolver {
    pub fn new(interface: Uri) -> Self {
        Self { interface }
    }

    pub async fn resolve(&self, uri: &Uri, handle: &InvokerHandle) -> Result<ResolutionResult, ResolutionError> {
        let mut failures = Vec::new();

        for delegate in handle.get_implementations(&self.interface) {
            if handle.budget().is_resolving_with(&delegate) {
                continue;
            }

            let scoped = handle.resolving_with(&delegate);
            match self.ask(&delegate, uri, &scoped).await {
                Ok(Some(result)) => {
                    debug!(%uri, %delegate, "resolved by extension");
                    return Ok(result);
                }
                Ok(None) => (),
                Err(DelegateError::InvalidPackage(reason)) => {
                    return Err(ResolutionError::InvalidPackage { uri: uri.clone(), reason });
                }
                Err(e) => {
                    warn!(%uri, %delegate, error = %e, "resolver extension failed");
                    failures.push(format!("{delegate}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            Ok(ResolutionResult::NotFound)
        } else {
            Err(ResolutionError::BackendFailure {
                uri: uri.clone(),
                reason: failures.join("; "),
            })
        }
    }

    async fn ask(
        &self,
        delegate: &Uri,
        uri: &Uri,
        handle: &InvokerHandle,
    ) -> Result<Option<ResolutionResult>, DelegateError> {
        let args = TryResolveArgs {
            authority: uri.authority(),
            path: uri.path(),
        };
        let answer: Option<MaybeUriOrManifest> = handle.invoke(delegate, TRY_RESOLVE_URI, &args).await?;

        let Some(answer) = answer else {
            return Ok(None);
        };

        if let Some(error) = answer.error {
            return Err(DelegateError::Answer(error));
        }

        if let Some(target) = answer.uri {
            let target = Uri::parse(&target)
                .map_err(|e| DelegateError::Answer(format!("redirect target '{target}': {e}")))?;
            return Ok(Some(ResolutionResult::Uri(target)));
        }

        let Some(manifest) = answer.manifest else {
            return Ok(None);
        };

        let file = GetFileArgs {
            path: format!("{}/{}", uri.path(), MODULE_FILE),
        };
        let bytes: Option<Vec<u8>> = handle.invoke(delegate, GET_FILE, &file).await?;
        let Some(bytes) = bytes else {
            return Err(DelegateError::InvalidPackage(format!("{} not served by {delegate}", file.path)));
        };

        let package = ModulePackage::from_parts(handle.module_runtime().clone(), bytes, &manifest)
            .map_err(|e| DelegateError::InvalidPackage(format!("manifest does not parse: {e}")))?;
        Ok(Some(ResolutionResult::Package(WrapPackage::Module(package))))
    }
}
