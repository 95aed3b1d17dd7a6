//! # Client configuration
//!
//! `ClientConfig` is immutable once built. The builder collects registrations in
//! order; wherever two registrations collide the later one wins, and an override
//! configuration (see `merged_with`) counts as later than its base.

use std::sync::Arc;

use wrapcore::ConfigFile;
use wrapcore::EnvRecord;
use wrapcore::InterfaceImplementations;
use wrapcore::Limits;
use wrapcore::Redirect;
use wrapcore::Uri;
use wrapcore::config;

use crate::module::ModuleRuntime;
use crate::plugin::PluginPackage;
use crate::resolver::Resolver;
use crate::wrapper::StaticEntry;
use crate::wrapper::WrapPackage;
use crate::wrapper::Wrapper;

pub use wrapcore::config::Error;
pub use wrapcore::config::Result;

#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    pub(crate) statics: Vec<(Uri, StaticEntry)>,
    pub(crate) redirects: Vec<Redirect>,
    pub(crate) interfaces: Vec<InterfaceImplementations>,
    pub(crate) envs: Vec<EnvRecord>,
    pub(crate) resolvers: Vec<Resolver>,
    pub(crate) resolver_interface: Option<Uri>,
    pub(crate) limits: Option<Limits>,
    pub(crate) runtime: Option<ModuleRuntime>,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn limits(&self) -> Limits {
        self.limits.clone().unwrap_or_default()
    }

    pub fn redirects(&self) -> &[Redirect] {
        &self.redirects
    }

    pub fn interfaces(&self) -> &[InterfaceImplementations] {
        &self.interfaces
    }

    pub fn envs(&self) -> &[EnvRecord] {
        &self.envs
    }

    /// Whether `uri` has an explicit interface binding.
    pub fn binds_interface(&self, uri: &Uri) -> bool {
        self.interfaces.iter().any(|binding| &binding.interface == uri)
    }

    /// Layers `over` on top of this configuration.
    ///
    /// Interface bindings in `over` replace the base bindings of the same
    /// interface. Environment records merge key by key. Extra resolvers of
    /// `over` are consulted before the base ones.
    pub fn merged_with(&self, over: &ClientConfig) -> ClientConfig {
        let mut statics = self.statics.clone();
        statics.extend(over.statics.iter().cloned());

        let mut redirects = self.redirects.clone();
        redirects.extend(over.redirects.iter().cloned());

        let mut interfaces: Vec<_> = self
            .interfaces
            .iter()
            .filter(|binding| !over.binds_interface(&binding.interface))
            .cloned()
            .collect();
        interfaces.extend(over.interfaces.iter().cloned());

        let mut envs = self.envs.clone();
        envs.extend(over.envs.iter().cloned());

        let mut resolvers = over.resolvers.clone();
        resolvers.extend(self.resolvers.iter().cloned());

        ClientConfig {
            statics,
            redirects,
            interfaces,
            envs,
            resolvers,
            resolver_interface: over.resolver_interface.clone().or_else(|| self.resolver_interface.clone()),
            limits: over.limits.clone().or_else(|| self.limits.clone()),
            runtime: over.runtime.clone().or_else(|| self.runtime.clone()),
        }
    }
}

/// Fluent builder for `ClientConfig`.
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin(mut self, uri: Uri, plugin: PluginPackage) -> Self {
        self.config
            .statics
            .push((uri, StaticEntry::Package(WrapPackage::Plugin(plugin))));
        self
    }

    pub fn package(mut self, uri: Uri, package: impl Into<WrapPackage>) -> Self {
        self.config.statics.push((uri, StaticEntry::Package(package.into())));
        self
    }

    pub fn wrapper(mut self, uri: Uri, wrapper: impl Into<Wrapper>) -> Self {
        self.config
            .statics
            .push((uri, StaticEntry::Wrapper(Arc::new(wrapper.into()))));
        self
    }

    pub fn redirect(mut self, from: Uri, to: Uri) -> Self {
        self.config.redirects.push(Redirect { from, to });
        self
    }

    /// Binds implementations to `interface`, appending to any earlier binding.
    pub fn interface(mut self, interface: Uri, implementations: impl IntoIterator<Item = Uri>) -> Self {
        let position = self
            .config
            .interfaces
            .iter()
            .position(|binding| binding.interface == interface);
        let binding = match position {
            Some(index) => &mut self.config.interfaces[index],
            None => {
                self.config.interfaces.push(InterfaceImplementations {
                    interface,
                    implementations: Vec::new(),
                });
                let last = self.config.interfaces.len() - 1;
                &mut self.config.interfaces[last]
            }
        };
        for implementation in implementations {
            if !binding.implementations.contains(&implementation) {
                binding.implementations.push(implementation);
            }
        }
        self
    }

    pub fn env(mut self, record: EnvRecord) -> Self {
        self.config.envs.push(record);
        self
    }

    /// Adds a resolver consulted after redirects and static registrations.
    pub fn resolver(mut self, resolver: impl Into<Resolver>) -> Self {
        self.config.resolvers.push(resolver.into());
        self
    }

    /// Interface whose implementations act as resolver extensions.
    pub fn resolver_interface(mut self, interface: Uri) -> Self {
        self.config.resolver_interface = Some(interface);
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.config.limits = Some(limits);
        self
    }

    pub fn module_runtime(mut self, runtime: ModuleRuntime) -> Self {
        self.config.runtime = Some(runtime);
        self
    }

    /// Applies the declarative part of a configuration file.
    pub fn with_file(mut self, file: ConfigFile) -> Self {
        for redirect in file.redirects {
            self = self.redirect(redirect.from, redirect.to);
        }
        for binding in file.interfaces {
            self = self.interface(binding.interface, binding.implementations);
        }
        self.config.envs.extend(file.envs);
        self.limits(file.limits)
    }

    pub fn build(self) -> Result<ClientConfig> {
        for redirect in &self.config.redirects {
            if redirect.from == redirect.to {
                return Err(config::Error::SelfRedirect(redirect.from.clone()));
            }
        }
        if let Some(limits) = &self.config.limits {
            limits.validate()?;
        }
        Ok(self.config)
    }
}
