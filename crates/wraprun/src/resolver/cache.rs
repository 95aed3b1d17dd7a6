//! # Resolution cache
//!
//! Memoizes instantiated wrappers per uri. Only successful resolutions to a
//! package or wrapper are stored: redirects are re-followed (the table may
//! differ for an override configuration) and `NotFound` is always re-asked.
//!
//! Two tasks racing to resolve the same uri may both do the backend work; the
//! first insert wins and both callers get the stored wrapper. A resolution that
//! is cancelled before completing leaves no entry behind.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use wrapcore::ResolutionError;
use wrapcore::Uri;

use crate::handle::InvokerHandle;
use crate::resolver::ResolutionResult;
use crate::resolver::Resolver;
use crate::wrapper::Wrapper;

#[derive(Debug, Default)]
pub struct ResolutionCache {
    wrappers: DashMap<Uri, Arc<Wrapper>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &Uri) -> Option<Arc<Wrapper>> {
        self.wrappers.get(uri).map(|entry| entry.value().clone())
    }

    /// Stores `wrapper` unless another one got there first; returns the stored one.
    pub fn insert(&self, uri: Uri, wrapper: Arc<Wrapper>) -> Arc<Wrapper> {
        self.wrappers.entry(uri).or_insert(wrapper).value().clone()
    }

    /// Removes and returns the wrapper cached for `uri`.
    pub fn invalidate(&self, uri: &Uri) -> Option<Arc<Wrapper>> {
        self.wrappers.remove(uri).map(|(_, wrapper)| wrapper)
    }

    pub fn clear(&self) {
        self.wrappers.clear();
    }

    pub fn contains(&self, uri: &Uri) -> bool {
        self.wrappers.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct CachingResolver {
    inner: Arc<Resolver>,
    cache: Arc<ResolutionCache>,
}

impl CachingResolver {
    pub fn new(inner: Resolver, cache: Arc<ResolutionCache>) -> Self {
        Self {
            inner: Arc::new(inner),
            cache,
        }
    }

    pub async fn resolve(&self, uri: &Uri, handle: &InvokerHandle) -> Result<ResolutionResult, ResolutionError> {
        if let Some(wrapper) = self.cache.get(uri) {
            debug!(%uri, "resolution cache hit");
            return Ok(ResolutionResult::Wrapper(wrapper));
        }

        match self.inner.try_resolve_uri(uri, handle).await? {
            ResolutionResult::Package(package) => {
                let wrapper = package
                    .create_wrapper()
                    .await
                    .map_err(|e| ResolutionError::InvalidPackage {
                        uri: uri.clone(),
                        reason: e.to_string(),
                    })?;
                debug!(%uri, "caching wrapper");
                Ok(ResolutionResult::Wrapper(self.cache.insert(uri.clone(), Arc::new(wrapper))))
            }
            ResolutionResult::Wrapper(wrapper) => {
                Ok(ResolutionResult::Wrapper(self.cache.insert(uri.clone(), wrapper)))
            }
            other => Ok(other),
        }
    }
}
