//! Statically registered packages and wrappers.

use std::collections::HashMap;
use std::sync::Arc;

use wrapcore::Uri;

use crate::resolver::ResolutionResult;
use crate::wrapper::StaticEntry;

#[derive(Clone, Debug, Default)]
pub struct StaticResolver {
    entries: Arc<HashMap<Uri, StaticEntry>>,
}

impl StaticResolver {
    /// Later entries for the same uri replace earlier ones.
    pub fn new(entries: impl IntoIterator<Item = (Uri, StaticEntry)>) -> Self {
        Self {
            entries: Arc::new(entries.into_iter().collect()),
        }
    }

    pub fn resolve(&self, uri: &Uri) -> ResolutionResult {
        match self.entries.get(uri) {
            Some(StaticEntry::Package(package)) => ResolutionResult::Package(package.clone()),
            Some(StaticEntry::Wrapper(wrapper)) => ResolutionResult::Wrapper(wrapper.clone()),
            None => ResolutionResult::NotFound,
        }
    }
}
