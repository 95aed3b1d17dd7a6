//! # Wrapper manifests
//!
//! The manifest is the part of a wrapper the invoker reads before dispatch:
//! which methods exist, which family each belongs to, what shape their
//! arguments have and whether they need an environment.
//!
//! Manifests travel as JSON (`WrapManifest::from_bytes`), the same codec used
//! for arguments and results.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::uri::Uri;

/// Family a method belongs to. Environment overlays are selected by family.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodFamily {
    Query,
    Mutation,
    Custom,
}

impl MethodFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Custom => "custom",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "query" => Some(Self::Query),
            "mutation" => Some(Self::Mutation),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for MethodFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A method name split into family and bare name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub family: MethodFamily,
    pub name: String,
}

impl MethodRef {
    pub fn new(family: MethodFamily, name: impl Into<String>) -> Self {
        Self { family, name: name.into() }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.family, self.name)
    }
}

/// What kind of wrapper a manifest describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapKind {
    Wasm,
    Plugin,
    Interface,
}

/// Declared shape of one argument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    #[default]
    Any,
    String,
    Number,
    Integer,
    Bool,
    Object,
    Array,
}

impl ArgType {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArgDecl {
    pub name: String,
    #[serde(default, rename = "type")]
    pub ty: ArgType,
    #[serde(default)]
    pub required: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub family: MethodFamily,
    pub name: String,
    #[serde(default)]
    pub args: Vec<ArgDecl>,
    #[serde(default)]
    pub env_required: bool,
}

impl MethodDecl {
    pub fn method_ref(&self) -> MethodRef {
        MethodRef::new(self.family.clone(), self.name.clone())
    }

    /// Checks `args` against the declared argument list.
    ///
    /// Returns a human readable reason on mismatch. Undeclared keys are allowed.
    pub fn validate_args(&self, args: &Value) -> std::result::Result<(), String> {
        if self.args.is_empty() {
            return Ok(());
        }

        let object = match args {
            Value::Object(map) => map,
            Value::Null if self.args.iter().all(|a| !a.required) => return Ok(()),
            other => return Err(format!("expected an argument object, got {}", kind_of(other))),
        };

        for decl in &self.args {
            match object.get(&decl.name) {
                None | Some(Value::Null) if decl.required => {
                    return Err(format!("missing required argument '{}'", decl.name));
                }
                None | Some(Value::Null) => (),
                Some(value) if !decl.ty.accepts(value) => {
                    return Err(format!(
                        "argument '{}' should be {:?}, got {}",
                        decl.name,
                        decl.ty,
                        kind_of(value)
                    ));
                }
                Some(_) => (),
            }
        }

        Ok(())
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Everything the invoker needs to know about a wrapper before calling it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WrapManifest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WrapKind,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    /// Interfaces this wrapper implements.
    #[serde(default)]
    pub implements: Vec<Uri>,
}

impl WrapManifest {
    pub fn new(name: impl Into<String>, kind: WrapKind) -> Self {
        Self {
            name: name.into(),
            kind,
            methods: Vec::new(),
            implements: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn implementing(mut self, interface: Uri) -> Self {
        self.implements.push(interface);
        self
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Splits `method` into family and name.
    ///
    /// `query.x` and `mutation.x` carry their family. A bare name takes the family
    /// of its declaration; undeclared bare names fall into the custom family.
    pub fn method_ref(&self, method: &str) -> MethodRef {
        if let Some((prefix, name)) = method.split_once('.') {
            if let Some(family) = MethodFamily::from_prefix(prefix) {
                return MethodRef::new(family, name);
            }
        }

        self.methods
            .iter()
            .find(|m| m.name == method)
            .map(MethodDecl::method_ref)
            .unwrap_or_else(|| MethodRef::new(MethodFamily::Custom, method))
    }

    pub fn method(&self, method: &MethodRef) -> Option<&MethodDecl> {
        self.methods
            .iter()
            .find(|m| m.family == method.family && m.name == method.name)
    }

    /// True when the manifest lists methods and `method` is not one of them.
    ///
    /// A manifest with no method list declares nothing and rejects nothing.
    pub fn rejects(&self, method: &MethodRef) -> bool {
        !self.methods.is_empty() && self.method(method).is_none()
    }

    pub fn env_required(&self, method: &MethodRef) -> bool {
        self.method(method).is_some_and(|m| m.env_required)
    }
}
