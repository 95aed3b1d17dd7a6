//! Redirect table lookups.

use std::collections::HashMap;
use std::sync::Arc;

use wrapcore::Redirect;
use wrapcore::Uri;

use crate::resolver::ResolutionResult;

#[derive(Clone, Debug, Default)]
pub struct RedirectResolver {
    redirects: Arc<HashMap<Uri, Uri>>,
}

impl RedirectResolver {
    /// Builds the table. A later redirect for the same source wins.
    pub fn new<'a>(redirects: impl IntoIterator<Item = &'a Redirect>) -> Self {
        let table = redirects
            .into_iter()
            .map(|r| (r.from.clone(), r.to.clone()))
            .collect();
        Self {
            redirects: Arc::new(table),
        }
    }

    pub fn resolve(&self, uri: &Uri) -> ResolutionResult {
        match self.redirects.get(uri) {
            Some(target) => ResolutionResult::Uri(target.clone()),
            None => ResolutionResult::NotFound,
        }
    }

    pub fn target(&self, uri: &Uri) -> Option<&Uri> {
        self.redirects.get(uri)
    }
}
