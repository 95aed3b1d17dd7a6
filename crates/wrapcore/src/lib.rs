//! # wrapcore
//!
//! Shared vocabulary for invoking uri-addressed wrappers: the `Uri` itself,
//! manifests and method families, per-uri environments, the byte codec, the
//! declarative configuration file and the error taxonomy. The engine that
//! resolves and runs wrappers lives in `wraprun`.

pub mod codec;
pub mod config;
pub mod env;
pub mod error;
pub mod manifest;
pub mod uri;

pub use config::ConfigFile;
pub use config::InterfaceImplementations;
pub use config::Limits;
pub use config::Redirect;
pub use env::EnvMap;
pub use env::EnvRecord;
pub use error::InvokeError;
pub use error::InvokeStage;
pub use error::ResolutionError;
pub use error::WrapError;
pub use manifest::ArgDecl;
pub use manifest::ArgType;
pub use manifest::MethodDecl;
pub use manifest::MethodFamily;
pub use manifest::MethodRef;
pub use manifest::WrapKind;
pub use manifest::WrapManifest;
pub use uri::Uri;
