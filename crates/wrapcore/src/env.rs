//! # Per-uri environments
//!
//! An environment record holds configuration values for one wrapper uri in three
//! layers: `common`, shared by every call, and the `query` and `mutation`
//! overlays. The environment a call sees is `common` merged with the overlay of
//! the invoked method's family, the overlay winning on key collisions.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::manifest::MethodFamily;
use crate::uri::Uri;

pub type EnvMap = Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvRecord {
    pub uri: Uri,
    #[serde(default)]
    pub common: EnvMap,
    #[serde(default)]
    pub query: EnvMap,
    #[serde(default)]
    pub mutation: EnvMap,
}

impl EnvRecord {
    pub fn new(uri: Uri) -> Self {
        Self {
            uri,
            common: EnvMap::new(),
            query: EnvMap::new(),
            mutation: EnvMap::new(),
        }
    }

    pub fn with_common(mut self, values: EnvMap) -> Self {
        self.common = values;
        self
    }

    pub fn with_query(mut self, values: EnvMap) -> Self {
        self.query = values;
        self
    }

    pub fn with_mutation(mut self, values: EnvMap) -> Self {
        self.mutation = values;
        self
    }

    pub fn overlay(&self, family: &MethodFamily) -> Option<&EnvMap> {
        match family {
            MethodFamily::Query => Some(&self.query),
            MethodFamily::Mutation => Some(&self.mutation),
            MethodFamily::Custom => None,
        }
    }

    /// The environment seen by a call in `family`.
    pub fn for_family(&self, family: &MethodFamily) -> EnvMap {
        let mut merged = self.common.clone();
        if let Some(overlay) = self.overlay(family) {
            merge_into(&mut merged, overlay);
        }
        merged
    }

    /// Layers `other` over `self`, per layer, `other` winning on collisions.
    pub fn merged_with(&self, other: &EnvRecord) -> EnvRecord {
        let mut out = self.clone();
        merge_into(&mut out.common, &other.common);
        merge_into(&mut out.query, &other.query);
        merge_into(&mut out.mutation, &other.mutation);
        out
    }
}

/// Shallow merge: every key of `overlay` replaces the one in `base`.
pub fn merge_into(base: &mut EnvMap, overlay: &EnvMap) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}
