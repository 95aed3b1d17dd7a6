//! # Resolution loop
//!
//! Follows redirects returned by the root resolver until it reaches a wrapper.
//! A package is instantiated where it is found. A uri reached twice is a cycle;
//! a chain longer than `Limits::max_redirects` is cut off even without repetition.

use std::sync::Arc;

use tracing::debug;
use tracing::instrument;
use wrapcore::ResolutionError;
use wrapcore::Uri;

use crate::handle::InvokerHandle;
use crate::resolver::ResolutionResult;
use crate::resolver::Resolver;
use crate::wrapper::Wrapper;

/// What one hop of a resolution produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Redirect(Uri),
    /// Resolved to a wrapper; carries the manifest name.
    Wrapper(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionStep {
    pub uri: Uri,
    pub outcome: StepOutcome,
}

/// A completed resolution.
#[derive(Clone, Debug)]
pub struct Resolution {
    /// The uri resolution started from.
    pub uri: Uri,
    /// The uri resolution terminated on.
    pub final_uri: Uri,
    pub wrapper: Arc<Wrapper>,
    pub history: Vec<ResolutionStep>,
}

impl Resolution {
    pub fn redirects(&self) -> usize {
        self.history
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::Redirect(_)))
            .count()
    }
}

#[instrument(skip_all, fields(%uri))]
pub(crate) async fn resolve(
    root: &Resolver,
    uri: &Uri,
    handle: &InvokerHandle,
    max_redirects: usize,
) -> Result<Resolution, ResolutionError> {
    let mut current = uri.clone();
    let mut chain = vec![current.clone()];
    let mut history = Vec::new();

    loop {
        match root.try_resolve_uri(&current, handle).await? {
            ResolutionResult::Uri(next) => {
                debug!(from = %current, to = %next, "redirect");
                let seen = chain.contains(&next);
                chain.push(next.clone());
                if seen || chain.len() - 1 > max_redirects {
                    return Err(ResolutionError::InfiniteRedirect { chain });
                }
                history.push(ResolutionStep {
                    uri: current,
                    outcome: StepOutcome::Redirect(next.clone()),
                });
                current = next;
            }
            ResolutionResult::Package(package) => {
                let wrapper = package
                    .create_wrapper()
                    .await
                    .map_err(|e| ResolutionError::InvalidPackage {
                        uri: current.clone(),
                        reason: e.to_string(),
                    })?;
                return Ok(finish(uri, current, Arc::new(wrapper), history));
            }
            ResolutionResult::Wrapper(wrapper) => return Ok(finish(uri, current, wrapper, history)),
            ResolutionResult::NotFound => return Err(ResolutionError::NotFound(current)),
        }
    }
}

fn finish(uri: &Uri, final_uri: Uri, wrapper: Arc<Wrapper>, mut history: Vec<ResolutionStep>) -> Resolution {
    history.push(ResolutionStep {
        uri: final_uri.clone(),
        outcome: StepOutcome::Wrapper(wrapper.manifest().name.clone()),
    });
    Resolution {
        uri: uri.clone(),
        final_uri,
        wrapper,
        history,
    }
}
