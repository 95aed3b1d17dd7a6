//! # wraprun
//!
//! Turns a `Uri` into a running wrapper and calls it.
//!
//! - `resolver`: the closed set of resolvers and the resolution cache
//! - `wrapper`: packages and wrappers, one invocation contract over both variants
//! - `module`: binary-module wrappers executed by wasmtime, with the host-call table
//! - `plugin`: natively registered wrappers built from a method table
//! - `client`: configuration, the resolution loop and the invocation pipeline
//! - `budget`: recursion and redirect limits threaded through a call tree

pub mod budget;
pub mod client;
pub mod handle;
pub mod module;
pub mod plugin;
pub mod resolver;
pub mod telemetry;
pub mod wrapper;

pub use budget::CallBudget;
pub use client::Client;
pub use client::ClientConfig;
pub use client::ClientConfigBuilder;
pub use client::InvokeOptions;
pub use client::Resolution;
pub use handle::InvokerHandle;
pub use module::ModulePackage;
pub use module::ModuleRuntime;
pub use plugin::MethodTable;
pub use plugin::PluginContext;
pub use plugin::PluginError;
pub use plugin::PluginPackage;
pub use resolver::ResolutionResult;
pub use resolver::Resolver;
pub use wrapper::WrapCall;
pub use wrapper::WrapPackage;
pub use wrapper::Wrapper;

pub use wrapcore;

#[cfg(test)]
mod tests;
