//! # Declarative configuration
//!
//! The serializable part of a client configuration: redirects, interface
//! bindings, environment records and limits. Plugins, packages and resolvers are
//! code and get registered through the builder in `wraprun`; this file format
//! covers everything that is plain data.

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::env::EnvRecord;
use crate::uri::Uri;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("'{0}' redirects to itself")]
    SelfRedirect(Uri),
    #[error("invalid limits: {0}")]
    InvalidLimits(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Bounds that guarantee every call tree terminates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Redirect hops allowed within one resolution.
    pub max_redirects: usize,
    /// Nesting depth of sub-invocations within one call tree.
    pub max_depth: usize,
    /// Total invocations allowed within one call tree.
    pub max_invocations: usize,
    /// Fuel granted to each binary-module invocation; `None` disables metering.
    pub fuel: Option<u64>,
    /// Linear memory cap for each binary-module instance.
    pub memory_bytes: usize,
}

impl Limits {
    pub fn validate(&self) -> Result<()> {
        if self.max_redirects == 0 {
            return Err(Error::InvalidLimits("max_redirects must be at least 1".into()));
        }
        if self.max_depth == 0 {
            return Err(Error::InvalidLimits("max_depth must be at least 1".into()));
        }
        if self.max_invocations == 0 {
            return Err(Error::InvalidLimits("max_invocations must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_redirects: 16,
            max_depth: 16,
            max_invocations: 1024,
            fuel: None,
            memory_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub from: Uri,
    pub to: Uri,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceImplementations {
    pub interface: Uri,
    #[serde(default)]
    pub implementations: Vec<Uri>,
}

/// JSON form of the declarative configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub redirects: Vec<Redirect>,
    pub interfaces: Vec<InterfaceImplementations>,
    pub envs: Vec<EnvRecord>,
    pub limits: Limits,
}

impl ConfigFile {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: Self = serde_json::from_str(raw)?;
        file.validate()?;
        Ok(file)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        for redirect in &self.redirects {
            if redirect.from == redirect.to {
                return Err(Error::SelfRedirect(redirect.from.clone()));
            }
        }
        self.limits.validate()
    }
}
