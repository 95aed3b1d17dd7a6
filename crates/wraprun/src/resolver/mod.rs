//! # Resolvers
//!
//! A resolver maps one `Uri` to one step of progress: another uri (a redirect),
//! a package, a live wrapper, or nothing. The set of resolvers is closed; the
//! client composes them into a single root chain:
//!
//! ```text
//! Caching(Aggregator[Redirect, Static, <user resolvers>..., Extendable])
//! ```
//!
//! Resolvers never follow redirects themselves. The resolution loop in
//! `client::resolution` does that, with cycle detection and a hop bound.

mod aggregator;
mod cache;
mod extendable;
mod fixed;
mod redirect;

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use wrapcore::ResolutionError;
use wrapcore::Uri;

use crate::handle::InvokerHandle;
use crate::wrapper::WrapPackage;
use crate::wrapper::Wrapper;

pub use aggregator::ResolverAggregator;
pub use cache::CachingResolver;
pub use cache::ResolutionCache;
pub use extendable::DEFAULT_RESOLVER_INTERFACE;
pub use extendable::ExtendableResolver;
pub use extendable::MaybeUriOrManifest;
pub use fixed::StaticResolver;
pub use redirect::RedirectResolver;

#[derive(Clone, Debug)]
pub enum ResolutionResult {
    Uri(Uri),
    Package(WrapPackage),
    Wrapper(Arc<Wrapper>),
    NotFound,
}

impl ResolutionResult {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[derive(Clone, Debug)]
pub enum Resolver {
    Static(StaticResolver),
    Redirect(RedirectResolver),
    Extendable(ExtendableResolver),
    Aggregator(ResolverAggregator),
    Caching(CachingResolver),
}

impl Resolver {
    /// One resolution step for `uri`.
    ///
    /// Sub-invocations made while resolving (extension delegates) go through
    /// `handle` and are charged to its budget.
    pub fn try_resolve_uri<'a>(
        &'a self,
        uri: &'a Uri,
        handle: &'a InvokerHandle,
    ) -> BoxFuture<'a, Result<ResolutionResult, ResolutionError>> {
        match self {
            Self::Static(resolver) => futures::future::ready(Ok(resolver.resolve(uri))).boxed(),
            Self::Redirect(resolver) => futures::future::ready(Ok(resolver.resolve(uri))).boxed(),
            Self::Extendable(resolver) => resolver.resolve(uri, handle).boxed(),
            Self::Aggregator(resolver) => resolver.resolve(uri, handle).boxed(),
            Self::Caching(resolver) => resolver.resolve(uri, handle).boxed(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Static(_) => "static",
            Self::Redirect(_) => "redirect",
            Self::Extendable(_) => "extendable",
            Self::Aggregator(_) => "aggregator",
            Self::Caching(_) => "caching",
        }
    }
}

impl From<StaticResolver> for Resolver {
    fn from(resolver: StaticResolver) -> Self {
        Self::Static(resolver)
    }
}

impl From<RedirectResolver> for Resolver {
    fn from(resolver: RedirectResolver) -> Self {
        Self::Redirect(resolver)
    }
}

impl From<ExtendableResolver> for Resolver {
    fn from(resolver: ExtendableResolver) -> Self {
        Self::Extendable(resolver)
    }
}

impl From<ResolverAggregator> for Resolver {
    fn from(resolver: ResolverAggregator) -> Self {
        Self::Aggregator(resolver)
    }
}

impl From<CachingResolver> for Resolver {
    fn from(resolver: CachingResolver) -> Self {
        Self::Caching(resolver)
    }
}
