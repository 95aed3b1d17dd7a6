//! Ordered resolver lists.

use std::sync::Arc;

use tracing::debug;
use wrapcore::ResolutionError;
use wrapcore::Uri;

use crate::handle::InvokerHandle;
use crate::resolver::ResolutionResult;
use crate::resolver::Resolver;

/// Asks each resolver in order; the first answer other than `NotFound` wins.
///
/// A `BackendFailure` is held while later resolvers are asked, and returned only
/// if none of them answers. Any other error ends the walk.
#[derive(Clone, Debug, Default)]
pub struct ResolverAggregator {
    resolvers: Arc<Vec<Resolver>>,
}

impl ResolverAggregator {
    pub fn new(resolvers: Vec<Resolver>) -> Self {
        Self {
            resolvers: Arc::new(resolvers),
        }
    }

    pub async fn resolve(&self, uri: &Uri, handle: &InvokerHandle) -> Result<ResolutionResult, ResolutionError> {
        let mut backend_failure = None;

        for resolver in self.resolvers.iter() {
            match resolver.try_resolve_uri(uri, handle).await {
                Ok(ResolutionResult::NotFound) => (),
                Ok(result) => {
                    debug!(%uri, resolver = resolver.name(), "resolved");
                    return Ok(result);
                }
                Err(e @ ResolutionError::BackendFailure { .. }) => {
                    debug!(%uri, resolver = resolver.name(), error = %e, "backend failure, trying the next resolver");
                    backend_failure.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        match backend_failure {
            Some(e) => Err(e),
            None => Ok(ResolutionResult::NotFound),
        }
    }
}
