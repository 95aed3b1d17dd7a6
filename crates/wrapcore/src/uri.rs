//! # Wrapper addresses
//!
//! A `Uri` names a wrapper or a resolution target: `scheme://authority/path`.
//! The scheme picks the resolver namespace, the authority the provider within it,
//! and the path is whatever the provider needs to find the wrapper.
//!
//! Uris are normalized once, at parse time, and never mutated afterwards.
//! Resolution that lands somewhere else produces a new `Uri`.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// Scheme assumed when the input has no `scheme://` prefix.
pub const DEFAULT_SCHEME: &str = "wrap";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("uri is empty")]
    Empty,
    #[error("uri '{0}' has an invalid scheme")]
    InvalidScheme(String),
    #[error("uri '{0}' has no authority")]
    MissingAuthority(String),
    #[error("uri '{0}' has no path")]
    MissingPath(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A parsed, normalized wrapper address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri {
    scheme: String,
    authority: String,
    path: String,
}

impl Uri {
    /// Parses and normalizes `input`.
    ///
    /// Whitespace is trimmed, runs of `/` collapse into one and the path loses
    /// its leading and trailing slashes. The scheme is lower-cased; authority and
    /// path keep their case. Both authority and path must be non-empty.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::Empty);
        }

        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => (DEFAULT_SCHEME.to_string(), trimmed),
        };

        if !is_valid_scheme(&scheme) {
            return Err(Error::InvalidScheme(trimmed.to_string()));
        }

        let mut segments = rest.split('/').filter(|s| !s.is_empty());
        let authority = segments
            .next()
            .ok_or_else(|| Error::MissingAuthority(trimmed.to_string()))?
            .to_string();

        let path = segments.collect::<Vec<_>>().join("/");
        if path.is_empty() {
            return Err(Error::MissingPath(trimmed.to_string()));
        }

        Ok(Self { scheme, authority, path })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => (),
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.authority, self.path)
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Uri {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Uri {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl Serialize for Uri {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Uri::parse(&raw).map_err(serde::de::Error::custom)
    }
}
